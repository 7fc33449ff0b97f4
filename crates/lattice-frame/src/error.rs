//! Frame codec errors.

use lattice_core::ErrorCode;
use thiserror::Error;

/// Errors raised by the frame codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Schema violation: missing required field, type mismatch, unknown QoS.
    #[error("bad frame: {0}")]
    BadFrame(String),

    /// Frame carries no signature where one is required.
    #[error("frame signature missing")]
    SignatureMissing,

    /// Signature did not verify against the canonical bytes.
    #[error("frame signature mismatch")]
    SignatureMismatch,

    /// Signing key is not known to the key manager.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// Duplicate frame within the replay window.
    #[error("replayed frame rejected: {0}")]
    Replay(String),

    /// Fragment checksum did not match its text.
    #[error("fragment checksum mismatch at frag_seq {frag_seq}")]
    ChecksumMismatch {
        /// The offending fragment index.
        frag_seq: u32,
    },

    /// Underlying crypto failure.
    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl FrameError {
    pub(crate) fn lock_poisoned() -> Self {
        Self::Crypto("key manager lock poisoned".to_string())
    }

    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadFrame(_)
            | Self::SignatureMissing
            | Self::SignatureMismatch
            | Self::UnknownKey(_)
            | Self::Replay(_)
            | Self::ChecksumMismatch { .. } => ErrorCode::BadFrame,
            Self::Crypto(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;
