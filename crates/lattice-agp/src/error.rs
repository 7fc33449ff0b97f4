//! AGP errors.

use lattice_core::ErrorCode;
use thiserror::Error;

use crate::route::Prefix;

/// Errors raised by the federation control plane.
#[derive(Debug, Error)]
pub enum AgpError {
    /// Loop prevention rejected an announced route.
    #[error("loop prevented for {prefix}: {rule}")]
    LoopPrevented {
        /// The announced prefix.
        prefix: Prefix,
        /// The rule that fired.
        rule: String,
    },

    /// An event arrived in a state that does not accept it.
    #[error("event {event} not valid in state {state}")]
    BadState {
        /// Current FSM state.
        state: String,
        /// Offending event.
        event: String,
    },

    /// Attestation or MAC failure.
    #[error("attestation failure: {0}")]
    Attestation(String),

    /// Frame TTL reached zero in transit.
    #[error("ttl expired in transit")]
    TtlExpired,

    /// Per-hop overhead drained a transit budget.
    #[error("budget exhausted in transit: tokens={tokens} usd_micros={usd_micros}")]
    BudgetExhaustedInTransit {
        /// Remaining (negative) token budget.
        tokens: i64,
        /// Remaining (negative) USD-micros budget.
        usd_micros: i64,
    },

    /// Malformed wrapper or message.
    #[error("malformed agp payload: {0}")]
    Malformed(String),

    /// Internal state failure.
    #[error("agp internal error: {0}")]
    Internal(String),
}

impl AgpError {
    pub(crate) fn poisoned() -> Self {
        Self::Internal("agp lock poisoned".to_string())
    }

    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Attestation(_) => ErrorCode::AttestationFailure,
            Self::BadState { .. } => ErrorCode::SequenceRetry,
            Self::Malformed(_) => ErrorCode::BadFrame,
            Self::LoopPrevented { .. }
            | Self::TtlExpired
            | Self::BudgetExhaustedInTransit { .. }
            | Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Result type for AGP operations.
pub type AgpResult<T> = Result<T, AgpError>;
