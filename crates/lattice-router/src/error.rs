//! Router errors.

use lattice_core::{ErrorCode, ModelId};
use thiserror::Error;

/// Errors raised by the decision engine.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Planning filtered out every model.
    #[error("no eligible models for task type: {task_type}")]
    NoEligibleModels {
        /// Task type that could not be served.
        task_type: String,
    },

    /// A registry record's manifest hash did not validate.
    #[error("manifest hash mismatch for model: {model_id}")]
    ManifestMismatch {
        /// The offending model.
        model_id: ModelId,
    },

    /// No such model in the registry.
    #[error("unknown model: {0}")]
    UnknownModel(ModelId),

    /// Operation requires a file-backed registry.
    #[error("registry is not file-backed")]
    NotPersistent,

    /// Custody log failure (blocks lifecycle changes).
    #[error(transparent)]
    Custody(#[from] lattice_audit::AuditError),

    /// Underlying IO failure.
    #[error("router io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization failure.
    #[error("router serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal state failure.
    #[error("router internal error: {0}")]
    Internal(String),
}

impl RouterError {
    pub(crate) fn poisoned() -> Self {
        Self::Internal("router lock poisoned".to_string())
    }

    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoEligibleModels { .. } | Self::UnknownModel(_) => ErrorCode::NoModelsAvailable,
            Self::ManifestMismatch { .. }
            | Self::NotPersistent
            | Self::Custody(_)
            | Self::Io(_)
            | Self::Serde(_)
            | Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;
