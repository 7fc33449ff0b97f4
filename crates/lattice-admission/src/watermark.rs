//! Queue-delay watermark driving ECN marks.
//!
//! The watermark flips HIGH after `require_n` consecutive observations
//! above `high_ms`, and back LOW after `require_n` consecutive
//! observations below `low_ms`. While HIGH, emitted frames carry the ECN
//! flag.

use lattice_config::WatermarkSection;
use std::sync::Mutex;
use tracing::info;

/// Pressure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkLevel {
    /// Normal operation.
    Low,
    /// Congested: ECN marks are set on emitted frames.
    High,
}

struct State {
    level: WatermarkLevel,
    consecutive_high: u32,
    consecutive_low: u32,
}

/// Watermark FSM over queue-delay observations.
pub struct Watermark {
    high_ms: f64,
    low_ms: f64,
    require_n: u32,
    state: Mutex<State>,
}

impl Watermark {
    /// Create a watermark from config.
    #[must_use]
    pub fn new(config: &WatermarkSection) -> Self {
        Self {
            high_ms: config.high_ms as f64,
            low_ms: config.low_ms as f64,
            require_n: config.require_n,
            state: Mutex::new(State {
                level: WatermarkLevel::Low,
                consecutive_high: 0,
                consecutive_low: 0,
            }),
        }
    }

    /// Feed one queue-delay observation; returns the (possibly new) level.
    pub fn observe(&self, delay_ms: f64) -> WatermarkLevel {
        let Ok(mut state) = self.state.lock() else {
            return WatermarkLevel::Low;
        };
        if delay_ms > self.high_ms {
            state.consecutive_high += 1;
            state.consecutive_low = 0;
            if state.level == WatermarkLevel::Low && state.consecutive_high >= self.require_n {
                state.level = WatermarkLevel::High;
                info!(delay_ms, "watermark HIGH, ecn marking enabled");
            }
        } else if delay_ms < self.low_ms {
            state.consecutive_low += 1;
            state.consecutive_high = 0;
            if state.level == WatermarkLevel::High && state.consecutive_low >= self.require_n {
                state.level = WatermarkLevel::Low;
                info!(delay_ms, "watermark LOW, ecn marking disabled");
            }
        } else {
            // Between the thresholds: streaks reset, level holds.
            state.consecutive_high = 0;
            state.consecutive_low = 0;
        }
        state.level
    }

    /// Current level.
    #[must_use]
    pub fn level(&self) -> WatermarkLevel {
        self.state
            .lock()
            .map(|s| s.level)
            .unwrap_or(WatermarkLevel::Low)
    }

    /// Whether emitted frames should carry the ECN flag.
    #[must_use]
    pub fn ecn_marking(&self) -> bool {
        self.level() == WatermarkLevel::High
    }
}
