//! Semantic validation of a merged configuration.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate cross-field constraints.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the first violated constraint.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.heartbeat.interval_s == 0 {
        return Err(invalid("heartbeat.interval_s must be positive"));
    }
    if config.heartbeat.idle_fin_s < config.heartbeat.interval_s {
        return Err(invalid(
            "heartbeat.idle_fin_s must be at least heartbeat.interval_s",
        ));
    }
    if config.budget.burn_window_s == 0 {
        return Err(invalid("budget.burn_window_s must be positive"));
    }
    if config.watermark.low_ms >= config.watermark.high_ms {
        return Err(invalid("watermark.low_ms must be below watermark.high_ms"));
    }
    if config.watermark.require_n == 0 {
        return Err(invalid("watermark.require_n must be positive"));
    }
    if config.aimd.min_cwnd == 0 {
        return Err(invalid("aimd.min_cwnd must be positive"));
    }
    if !(config.aimd.mul_dec_factor > 0.0 && config.aimd.mul_dec_factor < 1.0) {
        return Err(invalid("aimd.mul_dec_factor must be in (0, 1)"));
    }
    if config.circuit.fail_threshold == 0 {
        return Err(invalid("circuit.fail_threshold must be positive"));
    }
    if !(config.promote.cost_improve > 0.0 && config.promote.cost_improve < 1.0) {
        return Err(invalid("promote.cost_improve must be in (0, 1)"));
    }
    if config.demote.cost_regress <= 1.0 {
        return Err(invalid("demote.cost_regress must exceed 1.0"));
    }
    if config.agp.keepalive_interval == 0 || config.agp.hold_time == 0 {
        return Err(invalid("agp timers must be positive"));
    }
    if config.agp.hold_time < config.agp.keepalive_interval {
        return Err(invalid(
            "agp.hold_time must be at least agp.keepalive_interval",
        ));
    }
    if config.frame.max_fragment_bytes == 0 {
        return Err(invalid("frame.max_fragment_bytes must be positive"));
    }
    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
