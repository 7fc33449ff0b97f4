//! Heartbeat scheduling and idle finalization.

use std::time::{Duration, Instant};

/// What a heartbeat tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Emit an HB frame now.
    EmitHeartbeat,
    /// The stream idled out: emit FIN and finalize.
    EmitFin,
}

/// Tracks `last_activity` and `last_hb` for one stream.
pub struct HeartbeatScheduler {
    interval: Duration,
    idle_fin: Duration,
    last_activity: Instant,
    last_hb: Instant,
    heartbeats_tx: u64,
    finished: bool,
}

impl HeartbeatScheduler {
    /// Create a scheduler; both clocks start at `now`.
    #[must_use]
    pub fn new(interval_s: u64, idle_fin_s: u64, now: Instant) -> Self {
        Self {
            interval: Duration::from_secs(interval_s),
            idle_fin: Duration::from_secs(idle_fin_s),
            last_activity: now,
            last_hb: now,
            heartbeats_tx: 0,
            finished: false,
        }
    }

    /// Record stream activity (any frame in either direction).
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Evaluate timers. Emits at most one action per call; FIN wins over
    /// HB and is emitted once.
    pub fn tick(&mut self, now: Instant) -> Option<HeartbeatAction> {
        if self.finished {
            return None;
        }
        if now.duration_since(self.last_activity) >= self.idle_fin {
            self.finished = true;
            return Some(HeartbeatAction::EmitFin);
        }
        if now.duration_since(self.last_hb) >= self.interval {
            self.last_hb = now;
            self.heartbeats_tx += 1;
            return Some(HeartbeatAction::EmitHeartbeat);
        }
        None
    }

    /// Heartbeats emitted so far.
    #[must_use]
    pub fn heartbeats_tx(&self) -> u64 {
        self.heartbeats_tx
    }
}
