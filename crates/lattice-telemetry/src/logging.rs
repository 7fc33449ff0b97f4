//! Logging setup over the tracing ecosystem.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{TelemetryError, TelemetryResult};

/// Output format for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// Single-line compact output.
    Compact,
    /// JSON lines, for log pipelines.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Extra per-target directives (e.g. `"lattice_agp=trace"`).
    pub directives: Vec<String>,
}

impl LogConfig {
    /// Create a config with the given base level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            directives: Vec::new(),
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a per-target directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut spec = self.level.clone();
        for d in &self.directives {
            spec.push(',');
            spec.push_str(d);
        }
        spec.parse()
            .map_err(|e| TelemetryError::InvalidFilter(format!("{spec}: {e}")))
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error when the filter spec is malformed or a subscriber is
/// already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let result = match config.format {
        LogFormat::Pretty => fmt().with_env_filter(filter).pretty().try_init(),
        LogFormat::Compact => fmt().with_env_filter(filter).compact().try_init(),
        LogFormat::Json => fmt().with_env_filter(filter).json().try_init(),
    };
    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}
