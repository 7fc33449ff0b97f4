//! Stable error-code taxonomy.
//!
//! Every failure surfaced to a client or peer maps onto one of these codes.
//! The string forms are wire-stable: they appear in error frames, AGP ERROR
//! messages, and metric names, and must never change meaning.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stable set of error codes surfaced by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Request payload exceeds the admissible size.
    #[serde(rename = "prompt_too_large")]
    PromptTooLarge,
    /// No eligible model after filtering, or circuit open for every candidate.
    #[serde(rename = "no_models_available")]
    NoModelsAvailable,
    /// Tenant exceeded its request rate.
    #[serde(rename = "rate_limited")]
    RateLimited,
    /// Request cancelled after dispatch (deadline, client cancel, preemption kill).
    #[serde(rename = "request_cancelled")]
    RequestCancelled,
    /// Admission or queueing refused under load or budget exhaustion.
    #[serde(rename = "backpressure")]
    Backpressure,
    /// Frame failed schema validation or signature checks.
    #[serde(rename = "EBADFRAME")]
    BadFrame,
    /// Policy engine denied the request.
    #[serde(rename = "EPOLICY")]
    PolicyDenied,
    /// Configuration failed to load or validate.
    #[serde(rename = "ECFG")]
    ConfigFailure,
    /// Peer attestation invalid.
    #[serde(rename = "EATTEST")]
    AttestationFailure,
    /// Peer requested a sequence retry.
    #[serde(rename = "ESEQ_RETRY")]
    SequenceRetry,
    /// Unclassified internal failure.
    #[serde(rename = "internal_error")]
    Internal,
}

impl ErrorCode {
    /// All codes, for metric pre-registration.
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::PromptTooLarge,
        ErrorCode::NoModelsAvailable,
        ErrorCode::RateLimited,
        ErrorCode::RequestCancelled,
        ErrorCode::Backpressure,
        ErrorCode::BadFrame,
        ErrorCode::PolicyDenied,
        ErrorCode::ConfigFailure,
        ErrorCode::AttestationFailure,
        ErrorCode::SequenceRetry,
        ErrorCode::Internal,
    ];

    /// The stable wire string for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PromptTooLarge => "prompt_too_large",
            Self::NoModelsAvailable => "no_models_available",
            Self::RateLimited => "rate_limited",
            Self::RequestCancelled => "request_cancelled",
            Self::Backpressure => "backpressure",
            Self::BadFrame => "EBADFRAME",
            Self::PolicyDenied => "EPOLICY",
            Self::ConfigFailure => "ECFG",
            Self::AttestationFailure => "EATTEST",
            Self::SequenceRetry => "ESEQ_RETRY",
            Self::Internal => "internal_error",
        }
    }

    /// The counter name incremented when this code is emitted.
    #[must_use]
    pub fn metric_name(self) -> String {
        format!("error_code_{}_total", self.as_str())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The user-visible body of an error frame: a stable code plus a detail
/// string that must be free of PII.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code.
    pub code: ErrorCode,
    /// Sanitized human-readable detail.
    pub detail: String,
}

impl ErrorDetail {
    /// Build an error detail.
    #[must_use]
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}
