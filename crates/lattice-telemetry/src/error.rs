//! Telemetry errors.

use thiserror::Error;

/// Errors raised during telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The level/directive spec did not parse.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    /// The global subscriber could not be installed.
    #[error("subscriber init failed: {0}")]
    SubscriberInit(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
