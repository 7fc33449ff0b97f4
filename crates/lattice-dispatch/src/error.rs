//! Dispatch errors.

use lattice_core::{AdapterId, ErrorCode};
use thiserror::Error;

/// Errors raised by the adapter pool and adapter calls.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No adapter registered under this id.
    #[error("unknown adapter: {0}")]
    UnknownAdapter(AdapterId),

    /// The adapter's circuit is open; the candidate is skipped.
    #[error("circuit open for adapter: {0}")]
    CircuitOpen(AdapterId),

    /// Registration rejected.
    #[error("adapter registration failed: {0}")]
    Registration(String),

    /// Transport-level failure (connection, timeout, stream reset).
    /// Recoverable: retried, then the next candidate is tried.
    #[error("adapter transport failure: {0}")]
    Transport(String),

    /// Semantic failure reported by the adapter; surfaces to routing.
    #[error("adapter semantic failure: {0}")]
    Semantic(String),

    /// The call was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Whether this failure is transport-level (and so retryable).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownAdapter(_) | Self::CircuitOpen(_) => ErrorCode::NoModelsAvailable,
            Self::Cancelled => ErrorCode::RequestCancelled,
            Self::Registration(_) | Self::Transport(_) | Self::Semantic(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
