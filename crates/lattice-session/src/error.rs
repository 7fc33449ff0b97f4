//! Session errors.

use lattice_core::{ErrorCode, SessionId, StreamId};
use lattice_frame::FrameError;
use thiserror::Error;

/// Errors raised by the session and stream layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No such session.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// No such stream (and the frame carried no SYN).
    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    /// Illegal lifecycle transition.
    #[error("invalid stream transition: {from} -> {to}")]
    InvalidTransition {
        /// Phase the stream was in.
        from: String,
        /// Phase that was requested.
        to: String,
    },

    /// A message sequence at or below one already delivered.
    #[error("msg_seq {msg_seq} regresses below delivered {delivered}")]
    SequenceRegression {
        /// Offending sequence.
        msg_seq: u64,
        /// Highest delivered sequence.
        delivered: u64,
    },

    /// Fragment arrived for a terminal stream.
    #[error("stream is closed")]
    StreamClosed,

    /// Codec-level failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Internal state failure.
    #[error("session internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub(crate) fn poisoned() -> Self {
        Self::Internal("session lock poisoned".to_string())
    }

    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownSession(_)
            | Self::UnknownStream(_)
            | Self::InvalidTransition { .. }
            | Self::SequenceRegression { .. }
            | Self::StreamClosed => ErrorCode::BadFrame,
            Self::Frame(e) => e.code(),
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
