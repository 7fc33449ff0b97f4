//! Audit errors.

use thiserror::Error;

/// Errors raised by the custody log and observation store.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The custody chain failed verification.
    #[error("custody chain broken at line {line}: {reason}")]
    ChainBroken {
        /// Zero-based line of the first bad record.
        line: usize,
        /// What failed.
        reason: String,
    },

    /// Writes are halted after a verification failure.
    #[error("custody log is read-only after integrity failure")]
    ReadOnly,

    /// Underlying IO failure.
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization failure.
    #[error("audit serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Crypto setup failure.
    #[error("audit crypto error: {0}")]
    Crypto(String),
}

impl AuditError {
    pub(crate) fn lock() -> Self {
        Self::Crypto("audit lock poisoned".to_string())
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
