//! Hold-down and grace timers per prefix.
//!
//! On health degradation a hold-down starts: the route is not withdrawn
//! until it expires. On recovery a grace period starts: the route is not
//! re-announced until it expires. The timers are mutually exclusive:
//! recovery clears hold-down, degradation clears grace.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::route::Prefix;

#[derive(Debug, Clone, Copy)]
enum TimerState {
    HoldDownUntil(Instant),
    GraceUntil(Instant),
}

/// Per-prefix hold-down/grace tracking.
pub struct PrefixTimers {
    persist: Duration,
    grace: Duration,
    states: Mutex<HashMap<Prefix, TimerState>>,
}

impl PrefixTimers {
    /// Create timers with the configured windows.
    #[must_use]
    pub fn new(persist_s: u64, grace_s: u64) -> Self {
        Self {
            persist: Duration::from_secs(persist_s),
            grace: Duration::from_secs(grace_s),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Health degraded: start hold-down (clearing any grace).
    pub fn on_degradation(&self, prefix: &Prefix, now: Instant) {
        if let Ok(mut states) = self.states.lock() {
            debug!(prefix = %prefix, "hold-down started");
            states.insert(prefix.clone(), TimerState::HoldDownUntil(now + self.persist));
        }
    }

    /// Health recovered: start grace (clearing any hold-down).
    pub fn on_recovery(&self, prefix: &Prefix, now: Instant) {
        if let Ok(mut states) = self.states.lock() {
            debug!(prefix = %prefix, "grace period started");
            states.insert(prefix.clone(), TimerState::GraceUntil(now + self.grace));
        }
    }

    /// May a degraded prefix be withdrawn now? Only once its hold-down has
    /// expired.
    pub fn may_withdraw(&self, prefix: &Prefix, now: Instant) -> bool {
        match self.state_of(prefix) {
            Some(TimerState::HoldDownUntil(until)) => now >= until,
            // No hold-down pending: nothing delays the withdraw.
            _ => true,
        }
    }

    /// May a recovered prefix be re-announced now? Only once its grace
    /// period has expired.
    pub fn may_announce(&self, prefix: &Prefix, now: Instant) -> bool {
        match self.state_of(prefix) {
            Some(TimerState::GraceUntil(until)) => now >= until,
            _ => true,
        }
    }

    fn state_of(&self, prefix: &Prefix) -> Option<TimerState> {
        self.states.lock().ok()?.get(prefix).copied()
    }
}
