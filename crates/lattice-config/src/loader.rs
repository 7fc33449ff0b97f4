//! Config loading: embedded defaults, file overlay, env fallbacks.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Load configuration: defaults, then an optional overlay file, then env
/// fallbacks, then validation.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the overlay is unreadable or malformed, or
/// if the merged configuration fails validation.
pub fn load(overlay: Option<&Path>) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_string(),
            source: e,
        })?;

    if let Some(path) = overlay {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let overlay_value: toml::Value =
            toml::from_str(&text).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                source: e,
            })?;
        deep_merge(&mut merged, &overlay_value);
        info!(path = %path.display(), "loaded config overlay");
    }

    let mut config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;

    apply_env_fallbacks(&mut config);
    validate::validate(&config)?;
    Ok(config)
}

/// Parse a complete config from TOML text (defaults still apply for
/// omitted keys). Used by tests and the safe-mode loader.
pub fn load_from_str(text: &str) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_string(),
            source: e,
        })?;
    let overlay: toml::Value = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: "<inline>".to_string(),
        source: e,
    })?;
    deep_merge(&mut merged, &overlay);
    let mut config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;
    apply_env_fallbacks(&mut config);
    validate::validate(&config)?;
    Ok(config)
}

/// Recursively merge `overlay` into `base`; overlay scalars and arrays win,
/// tables merge key-wise.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_value) if base_value.is_table() && overlay_value.is_table() => {
                        deep_merge(base_value, overlay_value);
                    },
                    _ => {
                        base_table.insert(key.clone(), overlay_value.clone());
                    },
                }
            }
        },
        (base_slot, _) => *base_slot = overlay.clone(),
    }
}

fn apply_env_fallbacks(config: &mut Config) {
    if let Ok(level) = std::env::var("LATTICE_LOG") {
        if !level.is_empty() {
            debug!(level, "logging level taken from LATTICE_LOG");
            config.logging.level = level;
        }
    }
    if let Ok(format) = std::env::var("LATTICE_LOG_FORMAT") {
        if !format.is_empty() {
            config.logging.format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_load_and_validate() {
        let config = load(None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overlay_merges_partially() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[heartbeat]\ninterval_s = 2\n[aimd]\nmul_dec_factor = 0.25").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.heartbeat.interval_s, 2);
        // Unset keys keep their defaults.
        assert_eq!(config.heartbeat.idle_fin_s, 30);
        assert!((config.aimd.mul_dec_factor - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_overlay_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "heartbeat = 'not a table").unwrap();
        assert!(load(Some(file.path())).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load_from_str("[aimd]\nmul_dec_factor = 1.5").is_err());
        assert!(load_from_str("[agp]\nhold_time = 0").is_err());
    }
}
