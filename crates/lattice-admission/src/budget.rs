//! The triplet budget: parallel / tokens / USD-micros.
//!
//! Admission checks all three dimensions atomically under one lock: a
//! request is admitted only when `used + estimate <= limit` holds for every
//! dimension. Reservation books the estimate; ACK releases the parallel
//! slot; finalization reconciles the estimate against actuals.

use lattice_frame::TripletWindow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{AdmissionError, AdmissionResult};

/// The dimension that rejected an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetDimension {
    /// Concurrent streams.
    Parallel,
    /// Tokens.
    Tokens,
    /// USD-micros.
    UsdMicros,
}

impl fmt::Display for BudgetDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Tokens => write!(f, "tokens"),
            Self::UsdMicros => write!(f, "usd_micros"),
        }
    }
}

/// A cost estimate to admit against the budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct Estimate {
    /// Estimated tokens (input + output).
    pub tokens: u64,
    /// Estimated USD-micros.
    pub usd_micros: u64,
    /// Parallel slots requested (normally 1).
    pub parallel: u32,
}

#[derive(Debug, Default)]
struct Usage {
    tokens: u64,
    usd_micros: u64,
    parallel: u32,
}

/// Rolling USD burn-rate series: a bounded deque of
/// `(timestamp, usd_micros_delta)` summed over a configurable window.
#[derive(Debug)]
pub struct BurnRate {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    cap: usize,
}

impl BurnRate {
    /// Create a series over the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            cap: 4096,
        }
    }

    /// Record spend.
    pub fn record(&mut self, now: Instant, usd_micros: u64) {
        self.samples.push_back((now, usd_micros));
        if self.samples.len() > self.cap {
            self.samples.pop_front();
        }
        self.evict(now);
    }

    /// USD-micros per minute over the window ending at `now`.
    pub fn per_minute(&mut self, now: Instant) -> f64 {
        self.evict(now);
        let total: u64 = self.samples.iter().map(|(_, v)| v).sum();
        let window_mins = self.window.as_secs_f64() / 60.0;
        if window_mins <= 0.0 {
            return 0.0;
        }
        total as f64 / window_mins
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, _)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-session triplet budget with atomic three-dimension admission.
pub struct TripletBudget {
    limits: Mutex<TripletWindow>,
    usage: Mutex<Usage>,
    burn: Mutex<BurnRate>,
}

impl TripletBudget {
    /// Create a budget with the given limits and burn window.
    #[must_use]
    pub fn new(limits: TripletWindow, burn_window: Duration) -> Self {
        Self {
            limits: Mutex::new(limits),
            usage: Mutex::new(Usage::default()),
            burn: Mutex::new(BurnRate::new(burn_window)),
        }
    }

    /// Replace the limits (window update from the peer or the scheduler).
    pub fn set_limits(&self, limits: TripletWindow) {
        if let Ok(mut guard) = self.limits.lock() {
            *guard = limits;
        }
    }

    /// Current limits.
    #[must_use]
    pub fn limits(&self) -> TripletWindow {
        self.limits.lock().map(|g| *g).unwrap_or_default()
    }

    /// Check all three dimensions without reserving.
    pub fn preflight(&self, est: Estimate) -> AdmissionResult<()> {
        let limits = self.limits();
        let usage = self.usage.lock().map_err(|_| AdmissionError::poisoned())?;
        Self::check(&limits, &usage, est)
    }

    /// Atomically check and reserve an estimate.
    pub fn reserve(&self, est: Estimate) -> AdmissionResult<()> {
        let limits = self.limits();
        let mut usage = self.usage.lock().map_err(|_| AdmissionError::poisoned())?;
        Self::check(&limits, &usage, est)?;
        usage.tokens += est.tokens;
        usage.usd_micros += est.usd_micros;
        usage.parallel += est.parallel;
        trace!(
            tokens = usage.tokens,
            usd_micros = usage.usd_micros,
            parallel = usage.parallel,
            "budget reserved"
        );
        Ok(())
    }

    fn check(limits: &TripletWindow, usage: &Usage, est: Estimate) -> AdmissionResult<()> {
        if usage.parallel + est.parallel > limits.max_parallel {
            return Err(AdmissionError::Backpressure {
                dimension: BudgetDimension::Parallel,
            });
        }
        if usage.tokens + est.tokens > limits.max_tokens {
            return Err(AdmissionError::Backpressure {
                dimension: BudgetDimension::Tokens,
            });
        }
        if usage.usd_micros + est.usd_micros > limits.max_usd_micros {
            return Err(AdmissionError::Backpressure {
                dimension: BudgetDimension::UsdMicros,
            });
        }
        Ok(())
    }

    /// Release the parallel slot on ACK of the final frame.
    pub fn on_ack(&self, parallel: u32) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.parallel = usage.parallel.saturating_sub(parallel);
        }
    }

    /// Reconcile the booked estimate against actual consumption and feed
    /// the burn-rate series with the actual spend.
    pub fn reconcile(&self, est: Estimate, actual_tokens: u64, actual_usd_micros: u64) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.tokens = usage.tokens.saturating_sub(est.tokens) + actual_tokens;
            usage.usd_micros =
                usage.usd_micros.saturating_sub(est.usd_micros) + actual_usd_micros;
        }
        if let Ok(mut burn) = self.burn.lock() {
            burn.record(Instant::now(), actual_usd_micros);
        }
    }

    /// Release a reservation without booking any actual spend (cancelled
    /// before the adapter produced anything).
    pub fn release(&self, est: Estimate) {
        if let Ok(mut usage) = self.usage.lock() {
            usage.tokens = usage.tokens.saturating_sub(est.tokens);
            usage.usd_micros = usage.usd_micros.saturating_sub(est.usd_micros);
            usage.parallel = usage.parallel.saturating_sub(est.parallel);
        }
    }

    /// Current usage as `(tokens, usd_micros, parallel)`.
    #[must_use]
    pub fn usage(&self) -> (u64, u64, u32) {
        self.usage
            .lock()
            .map(|u| (u.tokens, u.usd_micros, u.parallel))
            .unwrap_or((0, 0, 0))
    }

    /// USD-micros per minute over the burn window.
    #[must_use]
    pub fn burn_per_minute(&self) -> f64 {
        self.burn
            .lock()
            .map(|mut b| b.per_minute(Instant::now()))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(tokens: u64, usd: u64, parallel: u32) -> TripletBudget {
        TripletBudget::new(
            TripletWindow {
                max_parallel: parallel,
                max_tokens: tokens,
                max_usd_micros: usd,
            },
            Duration::from_secs(300),
        )
    }

    fn est(tokens: u64, usd: u64) -> Estimate {
        Estimate {
            tokens,
            usd_micros: usd,
            parallel: 1,
        }
    }

    #[test]
    fn test_admission_at_exact_limit_admits() {
        let b = budget(1000, 1000, 2);
        assert!(b.reserve(est(1000, 1000)).is_ok());
    }

    #[test]
    fn test_one_unit_beyond_limit_is_backpressure() {
        let b = budget(1000, 10_000, 2);
        b.reserve(est(800, 0)).unwrap();
        let err = b.reserve(est(250, 0)).unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::Backpressure {
                dimension: BudgetDimension::Tokens
            }
        ));
        // The failed reserve must not have booked anything.
        assert_eq!(b.usage().0, 800);
    }

    #[test]
    fn test_all_three_dimensions_checked() {
        let b = budget(10, 10, 1);
        b.reserve(est(1, 1)).unwrap();
        // Parallel is exhausted even though tokens/USD are fine.
        assert!(matches!(
            b.reserve(est(1, 1)),
            Err(AdmissionError::Backpressure {
                dimension: BudgetDimension::Parallel
            })
        ));
    }

    #[test]
    fn test_ack_releases_parallel_only() {
        let b = budget(100, 100, 1);
        b.reserve(est(10, 10)).unwrap();
        b.on_ack(1);
        assert_eq!(b.usage(), (10, 10, 0));
        assert!(b.reserve(est(10, 10)).is_ok());
    }

    #[test]
    fn test_reconcile_replaces_estimate_with_actual() {
        let b = budget(1000, 1000, 4);
        let e = est(500, 400);
        b.reserve(e).unwrap();
        b.reconcile(e, 320, 250);
        let (tokens, usd, _) = b.usage();
        assert_eq!(tokens, 320);
        assert_eq!(usd, 250);
    }

    #[test]
    fn test_release_refunds_everything() {
        let b = budget(1000, 1000, 4);
        let e = est(500, 400);
        b.reserve(e).unwrap();
        b.release(e);
        assert_eq!(b.usage(), (0, 0, 0));
    }

    #[test]
    fn test_burn_rate_window() {
        let mut burn = BurnRate::new(Duration::from_secs(60));
        let start = Instant::now();
        burn.record(start, 600);
        // 600 usd-micros over a 1-minute window = 600 per minute.
        assert!((burn.per_minute(start) - 600.0).abs() < 1e-9);
        // Far past the window everything evicts.
        let later = start + Duration::from_secs(120);
        assert!((burn.per_minute(later) - 0.0).abs() < 1e-9);
    }
}
