//! Policy engine contract.
//!
//! The policy engine itself (OPA, ABAC, ...) lives outside the core; the
//! router consumes it through this typed interface. A denied check is
//! surfaced as `EPOLICY` with a sanitized reason and is never escalated
//! around.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The request attributes a policy check sees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyInput {
    /// Requesting tenant.
    pub tenant: String,
    /// Task type of the request.
    pub task_type: String,
    /// Data scope the request touches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_scope: Option<String>,
    /// Tool permissions requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_permissions: Vec<String>,
    /// Security groups of the tenant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
    /// Free-form request metadata.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// The result of a policy check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Whether the request may proceed.
    pub allow: bool,
    /// Sanitized reasons (also returned to the client on deny).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Attributes the engine enriched the request with.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub enriched_attrs: Value,
}

impl PolicyDecision {
    /// An unconditional allow.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allow: true,
            reasons: Vec::new(),
            enriched_attrs: Value::Null,
        }
    }

    /// A deny with one sanitized reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reasons: vec![reason.into()],
            enriched_attrs: Value::Null,
        }
    }
}

/// The consumed policy engine interface.
pub trait PolicyEngine: Send + Sync {
    /// Check a request.
    fn check(&self, input: &PolicyInput) -> PolicyDecision;
}

/// Permit-everything engine for deployments without an external policy
/// layer (and for tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllPolicy;

impl PolicyEngine for AllowAllPolicy {
    fn check(&self, _input: &PolicyInput) -> PolicyDecision {
        PolicyDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let engine = AllowAllPolicy;
        assert!(engine.check(&PolicyInput::default()).allow);
    }

    #[test]
    fn test_deny_carries_reason() {
        let decision = PolicyDecision::deny("tenant suspended");
        assert!(!decision.allow);
        assert_eq!(decision.reasons, vec!["tenant suspended".to_string()]);
    }

    #[test]
    fn test_decision_serde_round_trip() {
        let decision = PolicyDecision {
            allow: true,
            reasons: Vec::new(),
            enriched_attrs: serde_json::json!({ "region": "eu-1" }),
        };
        let json = serde_json::to_string(&decision).unwrap();
        let back: PolicyDecision = serde_json::from_str(&json).unwrap();
        assert!(back.allow);
        assert_eq!(back.enriched_attrs["region"], "eu-1");
    }
}
