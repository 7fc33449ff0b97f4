//! Admission errors.

use lattice_core::{ErrorCode, QosTier};
use thiserror::Error;

use crate::budget::BudgetDimension;

/// Errors raised by admission and flow control.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// A budget dimension would be exceeded.
    #[error("backpressure: {dimension} budget exhausted")]
    Backpressure {
        /// The dimension that rejected.
        dimension: BudgetDimension,
    },

    /// A QoS queue is full.
    #[error("backpressure: {qos} queue full")]
    QueueFull {
        /// The saturated tier.
        qos: QosTier,
    },

    /// Tenant exceeded its request rate.
    #[error("rate limited")]
    RateLimited,

    /// Internal state failure.
    #[error("admission internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    pub(crate) fn poisoned() -> Self {
        Self::Internal("admission lock poisoned".to_string())
    }

    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Backpressure { .. } | Self::QueueFull { .. } => ErrorCode::Backpressure,
            Self::RateLimited => ErrorCode::RateLimited,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for admission operations.
pub type AdmissionResult<T> = Result<T, AdmissionError>;
