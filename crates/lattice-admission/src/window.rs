//! WINDOW_UPDATE emission policy.
//!
//! A window update is emitted to a peer whenever any dimension moved by at
//! least `min_delta`, or `min_interval_s` elapsed since the last emission.
//! Each emission bumps `window_update_tx` and records a `window.update`
//! span carrying before/after/delta.

use lattice_config::WindowUpdateSection;
use lattice_frame::TripletWindow;
use lattice_telemetry::{MetricsRegistry, Span};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct LastEmission {
    window: TripletWindow,
    at: Instant,
}

/// Decides and records WINDOW_UPDATE emissions for one peer.
pub struct WindowUpdateEmitter {
    min_delta: u64,
    min_interval: Duration,
    last: Mutex<Option<LastEmission>>,
    metrics: Arc<MetricsRegistry>,
}

impl WindowUpdateEmitter {
    /// Create an emitter from config.
    #[must_use]
    pub fn new(config: &WindowUpdateSection, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            min_delta: config.min_delta,
            min_interval: Duration::from_secs(config.min_interval_s),
            last: Mutex::new(None),
            metrics,
        }
    }

    /// Offer the current window; returns `true` when an update should be
    /// sent now (and records it as sent).
    pub fn offer(&self, current: TripletWindow, now: Instant) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return false;
        };
        let should_emit = match last.as_ref() {
            None => true,
            Some(prev) => {
                delta_exceeds(&prev.window, &current, self.min_delta)
                    || now.duration_since(prev.at) >= self.min_interval
            },
        };
        if should_emit {
            let before = last.as_ref().map(|p| p.window);
            self.record(before, current);
            *last = Some(LastEmission {
                window: current,
                at: now,
            });
        }
        should_emit
    }

    fn record(&self, before: Option<TripletWindow>, after: TripletWindow) {
        self.metrics.counter("window_update_tx").inc();
        let mut span = Span::start("window.update");
        if let Some(before) = before {
            span.record("before", before.max_tokens);
            span.record(
                "delta",
                i128::from(after.max_tokens) - i128::from(before.max_tokens),
            );
        }
        span.record("after", after.max_tokens);
        span.finish();
    }
}

fn delta_exceeds(a: &TripletWindow, b: &TripletWindow, min_delta: u64) -> bool {
    let parallel = u64::from(a.max_parallel.abs_diff(b.max_parallel));
    parallel >= min_delta
        || a.max_tokens.abs_diff(b.max_tokens) >= min_delta
        || a.max_usd_micros.abs_diff(b.max_usd_micros) >= min_delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(tokens: u64) -> TripletWindow {
        TripletWindow {
            max_parallel: 4,
            max_tokens: tokens,
            max_usd_micros: 1_000,
        }
    }

    fn emitter(min_delta: u64, min_interval_s: u64) -> WindowUpdateEmitter {
        WindowUpdateEmitter::new(
            &WindowUpdateSection {
                min_delta,
                min_interval_s,
            },
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[test]
    fn test_first_offer_always_emits() {
        let e = emitter(10, 60);
        assert!(e.offer(window(100), Instant::now()));
    }

    #[test]
    fn test_small_delta_suppressed_until_interval() {
        let e = emitter(10, 60);
        let start = Instant::now();
        assert!(e.offer(window(100), start));
        assert!(!e.offer(window(105), start + Duration::from_secs(1)));
        // Interval elapsed: emits even with zero delta.
        assert!(e.offer(window(105), start + Duration::from_secs(61)));
    }

    #[test]
    fn test_large_delta_emits_immediately() {
        let e = emitter(10, 60);
        let start = Instant::now();
        assert!(e.offer(window(100), start));
        assert!(e.offer(window(50), start + Duration::from_millis(1)));
    }

    #[test]
    fn test_counter_increments_per_emission() {
        let metrics = Arc::new(MetricsRegistry::new());
        let e = WindowUpdateEmitter::new(
            &WindowUpdateSection {
                min_delta: 1,
                min_interval_s: 600,
            },
            Arc::clone(&metrics),
        );
        let start = Instant::now();
        e.offer(window(10), start);
        e.offer(window(20), start);
        e.offer(window(20), start);
        assert_eq!(metrics.counter_value("window_update_tx"), 2);
    }
}
