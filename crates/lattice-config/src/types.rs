//! Configuration types.
//!
//! Sections mirror the recognized key namespaces. Every struct implements
//! [`Default`] with the documented production defaults.

use serde::{Deserialize, Serialize};

/// Root configuration for a Lattice router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Heartbeat cadence and idle finalization.
    pub heartbeat: HeartbeatSection,
    /// Session budget defaults and burn-rate window.
    pub budget: BudgetSection,
    /// QoS scheduling knobs.
    pub qos: QosSection,
    /// Queue-depth watermark thresholds.
    pub watermark: WatermarkSection,
    /// AIMD window tuning.
    pub aimd: AimdSection,
    /// Adapter circuit breaker thresholds.
    pub circuit: CircuitSection,
    /// Model promotion thresholds.
    pub promote: PromoteSection,
    /// Model demotion thresholds.
    pub demote: DemoteSection,
    /// Seconds a model is exempt from lifecycle changes after its last one.
    #[serde(default = "default_hysteresis_sec")]
    pub promo_demo_hysteresis_sec: u64,
    /// Federation control-plane timers and safe mode.
    pub agp: AgpSection,
    /// Frame codec limits.
    pub frame: FrameSection,
    /// WINDOW_UPDATE emission policy.
    pub window_update: WindowUpdateSection,
    /// Logging level and format.
    pub logging: LoggingSection,
}

fn default_hysteresis_sec() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatSection::default(),
            budget: BudgetSection::default(),
            qos: QosSection::default(),
            watermark: WatermarkSection::default(),
            aimd: AimdSection::default(),
            circuit: CircuitSection::default(),
            promote: PromoteSection::default(),
            demote: DemoteSection::default(),
            promo_demo_hysteresis_sec: default_hysteresis_sec(),
            agp: AgpSection::default(),
            frame: FrameSection::default(),
            window_update: WindowUpdateSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

/// Heartbeat cadence and idle finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSection {
    /// Seconds between emitted heartbeats.
    pub interval_s: u64,
    /// Seconds of inactivity before a FIN is emitted.
    pub idle_fin_s: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_s: 10,
            idle_fin_s: 30,
        }
    }
}

/// Session budget defaults and burn-rate window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    /// Default token budget for a new session.
    pub default_tokens: u64,
    /// Default USD-micros budget for a new session.
    pub default_usd_micros: u64,
    /// Default parallel-stream budget for a new session.
    pub default_parallel: u32,
    /// Rolling window for the USD burn-rate series, in seconds.
    pub burn_window_s: u64,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            default_tokens: 100_000,
            default_usd_micros: 5_000_000,
            default_parallel: 4,
            burn_window_s: 300,
        }
    }
}

/// QoS scheduling knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosSection {
    /// Scheduler sub-section.
    pub scheduler: QosSchedulerSection,
}

/// Scheduler sub-section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosSchedulerSection {
    /// Preemption policy.
    pub preempt: PreemptSection,
}

/// Preemption policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptSection {
    /// Whether higher-tier demand may drain lower-tier sessions.
    pub enabled: bool,
}

impl Default for PreemptSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Queue-depth watermark thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSection {
    /// Queue-delay observation above which pressure is HIGH, in ms.
    pub high_ms: u64,
    /// Queue-delay observation below which pressure returns LOW, in ms.
    pub low_ms: u64,
    /// Consecutive observations required before flipping.
    pub require_n: u32,
}

impl Default for WatermarkSection {
    fn default() -> Self {
        Self {
            high_ms: 250,
            low_ms: 100,
            require_n: 3,
        }
    }
}

/// AIMD window tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AimdSection {
    /// Floor for the congestion window.
    pub min_cwnd: u32,
    /// Additive increase step on positive feedback.
    pub additive_inc: u32,
    /// Multiplicative decrease factor on ECN/timeout.
    pub mul_dec_factor: f64,
}

impl Default for AimdSection {
    fn default() -> Self {
        Self {
            min_cwnd: 1,
            additive_inc: 1,
            mul_dec_factor: 0.5,
        }
    }
}

/// Adapter circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSection {
    /// Consecutive failures before the circuit opens.
    pub fail_threshold: u32,
    /// Seconds an open circuit waits before probing.
    pub reset_timeout_s: u64,
    /// Successful probes required to close a half-open circuit.
    pub half_open_successes: u32,
}

impl Default for CircuitSection {
    fn default() -> Self {
        Self {
            fail_threshold: 5,
            reset_timeout_s: 30,
            half_open_successes: 2,
        }
    }
}

/// Model promotion thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromoteSection {
    /// Minimum shadow calls before promotion is considered.
    pub min_calls: u64,
    /// Shadow cost must beat this fraction of the primary's cost.
    pub cost_improve: f64,
}

impl Default for PromoteSection {
    fn default() -> Self {
        Self {
            min_calls: 5,
            cost_improve: 0.9,
        }
    }
}

/// Model demotion thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoteSection {
    /// Minimum active calls before demotion is considered.
    pub min_calls: u64,
    /// Active cost exceeding this multiple of the cheapest active demotes.
    pub cost_regress: f64,
}

impl Default for DemoteSection {
    fn default() -> Self {
        Self {
            min_calls: 6,
            cost_regress: 1.25,
        }
    }
}

/// Federation control-plane timers and safe mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgpSection {
    /// Seconds between KEEPALIVEs.
    pub keepalive_interval: u64,
    /// Seconds without a KEEPALIVE before the session drops.
    pub hold_time: u64,
    /// Missed KEEPALIVEs tolerated before returning to IDLE.
    pub max_keepalive_misses: u32,
    /// Flap dampening decay.
    pub dampening: DampeningSection,
    /// Seconds degradation must persist before a withdraw.
    pub persist_s: u64,
    /// Seconds recovery must persist before a re-announce.
    pub grace_s: u64,
    /// Safe-mode retry policy.
    pub safe_mode: SafeModeSection,
    /// Router Label Header per-hop overhead model.
    pub rlh: RlhSection,
}

impl Default for AgpSection {
    fn default() -> Self {
        Self {
            keepalive_interval: 10,
            hold_time: 30,
            max_keepalive_misses: 3,
            dampening: DampeningSection::default(),
            persist_s: 8,
            grace_s: 5,
            safe_mode: SafeModeSection::default(),
            rlh: RlhSection::default(),
        }
    }
}

/// Flap dampening decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampeningSection {
    /// Penalty half-life in minutes.
    pub half_life_min: u64,
}

impl Default for DampeningSection {
    fn default() -> Self {
        Self { half_life_min: 15 }
    }
}

/// Safe-mode retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeModeSection {
    /// Load attempts before falling back to last-known-good.
    pub max_retries: u32,
    /// Seconds between attempts.
    pub retry_delay_s: u64,
}

impl Default for SafeModeSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_s: 5,
        }
    }
}

/// Router Label Header per-hop overhead model.
///
/// Token overhead per hop is `alpha * payload_bytes + beta`; USD-micros
/// overhead is `gamma * payload_bytes + delta`. Constants are fixed per
/// deployment; they are not negotiated in OPEN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlhSection {
    /// Token overhead per payload byte.
    pub alpha: f64,
    /// Flat token overhead per hop.
    pub beta: f64,
    /// USD-micros overhead per payload byte.
    pub gamma: f64,
    /// Flat USD-micros overhead per hop.
    pub delta: f64,
}

impl Default for RlhSection {
    fn default() -> Self {
        Self {
            alpha: 0.001,
            beta: 8.0,
            gamma: 0.0001,
            delta: 1.0,
        }
    }
}

/// Frame codec limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSection {
    /// Replay window TTL, in seconds.
    pub replay_ttl_s: u64,
    /// Maximum payload bytes per fragment.
    pub max_fragment_bytes: usize,
    /// Seconds a reassembly gap may stay open.
    pub gap_ttl_s: u64,
    /// Maximum admissible prompt size in bytes.
    pub max_prompt_bytes: usize,
}

impl Default for FrameSection {
    fn default() -> Self {
        Self {
            replay_ttl_s: 120,
            max_fragment_bytes: 32 * 1024,
            gap_ttl_s: 30,
            max_prompt_bytes: 256 * 1024,
        }
    }
}

/// WINDOW_UPDATE emission policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowUpdateSection {
    /// Minimum change in any window dimension that forces an emission.
    pub min_delta: u64,
    /// Maximum seconds between emissions regardless of delta.
    pub min_interval_s: u64,
}

impl Default for WindowUpdateSection {
    fn default() -> Self {
        Self {
            min_delta: 1,
            min_interval_s: 5,
        }
    }
}

/// Logging level and format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `"pretty"`, `"compact"`, or `"json"`.
    pub format: String,
    /// Extra per-target directives.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directives: Vec::new(),
        }
    }
}
