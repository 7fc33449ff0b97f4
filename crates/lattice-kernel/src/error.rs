//! Kernel errors: the union of subsystem failures, mapped to wire codes.

use lattice_core::ErrorCode;
use thiserror::Error;

/// Errors surfaced by the kernel pipeline.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Frame codec failure.
    #[error(transparent)]
    Frame(#[from] lattice_frame::FrameError),

    /// Session layer failure.
    #[error(transparent)]
    Session(#[from] lattice_session::SessionError),

    /// Admission refusal.
    #[error(transparent)]
    Admission(#[from] lattice_admission::AdmissionError),

    /// Dispatch failure.
    #[error(transparent)]
    Dispatch(#[from] lattice_dispatch::DispatchError),

    /// Routing failure.
    #[error(transparent)]
    Router(#[from] lattice_router::RouterError),

    /// Audit failure.
    #[error(transparent)]
    Audit(#[from] lattice_audit::AuditError),

    /// Federation failure.
    #[error(transparent)]
    Agp(#[from] lattice_agp::AgpError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] lattice_config::ConfigError),

    /// The prompt exceeds the admissible size.
    #[error("prompt of {size} bytes exceeds limit of {limit}")]
    PromptTooLarge {
        /// Observed prompt size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The policy engine denied the request; escalation is not attempted.
    #[error("policy denied: {reason}")]
    PolicyDenied {
        /// Sanitized denial reason.
        reason: String,
    },

    /// The request's deadline lapsed while it sat in the queue.
    #[error("deadline expired while queued")]
    DeadlineExpiredQueued,

    /// A replayed frame was rejected.
    #[error("replayed frame rejected")]
    Replay,

    /// Every candidate failed or was exhausted.
    #[error("all candidates exhausted")]
    CandidatesExhausted,

    /// Internal failure.
    #[error("kernel internal error: {0}")]
    Internal(String),
}

impl KernelError {
    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Frame(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Admission(e) => e.code(),
            Self::Dispatch(e) => e.code(),
            Self::Router(e) => e.code(),
            Self::Agp(e) => e.code(),
            Self::Audit(_) | Self::Internal(_) => ErrorCode::Internal,
            Self::Config(_) => ErrorCode::ConfigFailure,
            Self::PromptTooLarge { .. } => ErrorCode::PromptTooLarge,
            Self::DeadlineExpiredQueued => ErrorCode::Backpressure,
            Self::PolicyDenied { .. } => ErrorCode::PolicyDenied,
            Self::Replay => ErrorCode::BadFrame,
            Self::CandidatesExhausted => ErrorCode::NoModelsAvailable,
        }
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
