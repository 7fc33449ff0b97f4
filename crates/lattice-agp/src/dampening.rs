//! Flap dampening with exponential penalty decay.
//!
//! Each flap (announce/withdraw toggle) adds a fixed penalty. Exceeding
//! the suppress threshold hides the route until the decayed penalty falls
//! below the reuse threshold. Penalty halves every `half_life`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

use crate::route::Prefix;

/// Penalty added per flap.
pub const FLAP_PENALTY: f64 = 1000.0;
/// Penalty above which a prefix is suppressed.
pub const SUPPRESS_THRESHOLD: f64 = 3000.0;
/// Penalty below which a suppressed prefix is reusable again.
pub const REUSE_THRESHOLD: f64 = 1500.0;

struct PenaltyState {
    penalty: f64,
    updated: Instant,
    suppressed: bool,
}

/// Per-prefix flap dampener.
pub struct FlapDampener {
    half_life: Duration,
    states: Mutex<HashMap<Prefix, PenaltyState>>,
}

impl FlapDampener {
    /// Create a dampener with the given penalty half-life.
    #[must_use]
    pub fn new(half_life: Duration) -> Self {
        Self {
            half_life,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record one flap for a prefix. Returns `true` when the prefix is now
    /// suppressed.
    pub fn record_flap(&self, prefix: &Prefix, now: Instant) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };
        let state = states.entry(prefix.clone()).or_insert(PenaltyState {
            penalty: 0.0,
            updated: now,
            suppressed: false,
        });
        Self::decay_to(state, now, self.half_life);
        state.penalty += FLAP_PENALTY;
        if !state.suppressed && state.penalty > SUPPRESS_THRESHOLD {
            state.suppressed = true;
            info!(prefix = %prefix, penalty = state.penalty, "prefix suppressed by dampening");
        }
        state.suppressed
    }

    /// Whether a prefix is currently suppressed.
    pub fn is_suppressed(&self, prefix: &Prefix, now: Instant) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };
        let Some(state) = states.get_mut(prefix) else {
            return false;
        };
        Self::decay_to(state, now, self.half_life);
        if state.suppressed && state.penalty < REUSE_THRESHOLD {
            state.suppressed = false;
            info!(prefix = %prefix, penalty = state.penalty, "prefix reusable again");
        }
        state.suppressed
    }

    /// Current decayed penalty (diagnostics).
    pub fn penalty(&self, prefix: &Prefix, now: Instant) -> f64 {
        let Ok(mut states) = self.states.lock() else {
            return 0.0;
        };
        states.get_mut(prefix).map_or(0.0, |state| {
            Self::decay_to(state, now, self.half_life);
            state.penalty
        })
    }

    fn decay_to(state: &mut PenaltyState, now: Instant, half_life: Duration) {
        let elapsed = now.saturating_duration_since(state.updated);
        if elapsed.is_zero() {
            return;
        }
        let halves = elapsed.as_secs_f64() / half_life.as_secs_f64();
        state.penalty *= 0.5f64.powf(halves);
        state.updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> Prefix {
        Prefix::new("reviewer.*")
    }

    #[test]
    fn test_suppression_after_enough_flaps() {
        let dampener = FlapDampener::new(Duration::from_secs(900));
        let now = Instant::now();
        // Threshold 3000 at penalty 1000 per flap: the fourth flap
        // suppresses.
        assert!(!dampener.record_flap(&prefix(), now));
        assert!(!dampener.record_flap(&prefix(), now));
        assert!(!dampener.record_flap(&prefix(), now));
        assert!(dampener.record_flap(&prefix(), now));
        assert!(dampener.is_suppressed(&prefix(), now));
    }

    #[test]
    fn test_penalty_halves_per_half_life() {
        let dampener = FlapDampener::new(Duration::from_secs(900));
        let now = Instant::now();
        dampener.record_flap(&prefix(), now);
        let later = now + Duration::from_secs(900);
        assert!((dampener.penalty(&prefix(), later) - 500.0).abs() < 1.0);
    }

    #[test]
    fn test_suppression_lifts_after_decay() {
        let dampener = FlapDampener::new(Duration::from_secs(900));
        let now = Instant::now();
        for _ in 0..4 {
            dampener.record_flap(&prefix(), now);
        }
        assert!(dampener.is_suppressed(&prefix(), now));
        // 4000 decays below the reuse threshold (1500) after ~1.5
        // half-lives; two half-lives is safely past it.
        let later = now + Duration::from_secs(1800);
        assert!(!dampener.is_suppressed(&prefix(), later));
    }

    #[test]
    fn test_unknown_prefix_not_suppressed() {
        let dampener = FlapDampener::new(Duration::from_secs(900));
        assert!(!dampener.is_suppressed(&prefix(), Instant::now()));
    }
}
