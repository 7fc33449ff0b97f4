//! AGP wire messages.

use lattice_core::{Adn, RouterId};
use serde::{Deserialize, Serialize};

use crate::persona::PersonaStatsUpdate;
use crate::route::{Prefix, Route};

/// AGP protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgpErrorCode {
    /// Policy rejected the session or update.
    #[serde(rename = "EPOLICY")]
    Policy,
    /// Configuration failure.
    #[serde(rename = "ECFG")]
    Config,
    /// Attestation invalid.
    #[serde(rename = "EATTEST")]
    Attestation,
    /// Sequence retry requested.
    #[serde(rename = "ESEQ_RETRY")]
    SeqRetry,
}

/// Contents of an OPEN message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInfo {
    /// Sender's router id.
    pub router_id: RouterId,
    /// Sender's agent domain number.
    pub adn: Adn,
    /// Protocol major versions the sender speaks, ascending.
    pub versions: Vec<u32>,
    /// Capability strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// Route-Reflector cluster id, when the sender is a reflector client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rr_cluster_id: Option<u32>,
    /// Proposed keepalive interval in seconds.
    pub keepalive_interval: u64,
}

/// One announced route with its attestation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAnnouncement {
    /// The route and its attributes.
    pub route: Route,
    /// Optional attestation blob over the route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
}

/// The AGP message set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgpMessage {
    /// Session open.
    Open(OpenInfo),
    /// Liveness.
    Keepalive,
    /// Reachability update.
    Update {
        /// Routes announced.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        announce: Vec<RouteAnnouncement>,
        /// Prefixes withdrawn.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        withdraw: Vec<Prefix>,
    },
    /// Request a full re-advertisement.
    RouteRefresh,
    /// Protocol error.
    Error {
        /// Stable error code.
        code: AgpErrorCode,
        /// Sanitized detail.
        detail: String,
    },
    /// Federated persona reputation record.
    PersonaStatsUpdate(PersonaStatsUpdate),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trip() {
        let msg = AgpMessage::Open(OpenInfo {
            router_id: RouterId::new("r1"),
            adn: Adn(64512),
            versions: vec![1],
            capabilities: vec!["rr".to_string()],
            rr_cluster_id: Some(7),
            keepalive_interval: 10,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"OPEN\""));
        let back: AgpMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_error_codes_stable() {
        let json = serde_json::to_string(&AgpErrorCode::SeqRetry).unwrap();
        assert_eq!(json, "\"ESEQ_RETRY\"");
    }

    #[test]
    fn test_update_omits_empty_lists() {
        let msg = AgpMessage::Update {
            announce: Vec::new(),
            withdraw: vec![Prefix::new("reviewer.*")],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("announce"));
        assert!(json.contains("withdraw"));
    }
}
