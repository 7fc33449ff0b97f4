//! Router Label Header for inter-router data-plane forwarding.
//!
//! For a non-local prefix the frame gets an RLH naming the destination
//! router, the egress agent, QoS, TTL, remaining budgets, flags, and an
//! HMAC over the header. Each hop decrements the budgets by the declared
//! overhead model (`alpha * payload + beta` tokens, `gamma * payload +
//! delta` USD-micros); a budget going negative drops the frame with an
//! error. TTL decrement prevents forwarding loops.

use hmac::{Hmac, Mac};
use lattice_config::RlhSection;
use lattice_core::{QosTier, RouterId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::error::{AgpError, AgpResult};

type HmacSha256 = Hmac<Sha256>;

/// Router Label Header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RlhFlags {
    /// The carried frame resumes an earlier stream.
    #[serde(default)]
    pub resume: bool,
    /// The carried frame is a fragment.
    #[serde(default)]
    pub frag: bool,
    /// Congestion observed along the path.
    #[serde(default)]
    pub ecn: bool,
}

/// The label header pushed onto ATP frames crossing routers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterLabelHeader {
    /// Destination router.
    pub dst_router_id: RouterId,
    /// Egress agent at the destination.
    pub egress_agent_id: String,
    /// QoS tier of the carried frame.
    pub qos: QosTier,
    /// Hop budget.
    pub ttl: u8,
    /// Remaining token budget along the path.
    pub budget_tokens: i64,
    /// Remaining USD-micros budget along the path.
    pub budget_usd_micros: i64,
    /// Header flags.
    #[serde(default)]
    pub flags: RlhFlags,
    /// HMAC over the header with this field empty.
    pub hmac: String,
}

impl RouterLabelHeader {
    /// Push a new header for a frame bound to `dst` via the federation.
    pub fn push(
        dst_router_id: RouterId,
        egress_agent_id: impl Into<String>,
        qos: QosTier,
        ttl: u8,
        budget_tokens: i64,
        budget_usd_micros: i64,
        flags: RlhFlags,
        key: &[u8],
    ) -> AgpResult<Self> {
        let mut header = Self {
            dst_router_id,
            egress_agent_id: egress_agent_id.into(),
            qos,
            ttl,
            budget_tokens,
            budget_usd_micros,
            flags,
            hmac: String::new(),
        };
        header.hmac = header.mac(key)?;
        Ok(header)
    }

    /// Verify the header HMAC.
    pub fn verify(&self, key: &[u8]) -> AgpResult<()> {
        let expected = self.mac(key)?;
        if expected != self.hmac {
            return Err(AgpError::Attestation("rlh hmac mismatch".to_string()));
        }
        Ok(())
    }

    /// Apply one hop: decrement TTL and charge the declared overhead for a
    /// payload of `payload_bytes`. Re-MACs the header.
    ///
    /// # Errors
    ///
    /// `ESEQ_RETRY`-class loop error when TTL hits zero; budget errors when
    /// either budget goes negative.
    pub fn hop(&mut self, payload_bytes: usize, model: &RlhSection, key: &[u8]) -> AgpResult<()> {
        if self.ttl == 0 {
            return Err(AgpError::TtlExpired);
        }
        self.ttl -= 1;

        let payload = payload_bytes as f64;
        let token_overhead = (model.alpha * payload + model.beta).ceil() as i64;
        let usd_overhead = (model.gamma * payload + model.delta).ceil() as i64;
        self.budget_tokens -= token_overhead;
        self.budget_usd_micros -= usd_overhead;
        if self.budget_tokens < 0 || self.budget_usd_micros < 0 {
            return Err(AgpError::BudgetExhaustedInTransit {
                tokens: self.budget_tokens,
                usd_micros: self.budget_usd_micros,
            });
        }
        debug!(
            ttl = self.ttl,
            budget_tokens = self.budget_tokens,
            budget_usd_micros = self.budget_usd_micros,
            "rlh hop applied"
        );
        self.hmac = self.mac(key)?;
        Ok(())
    }

    /// Attach this header to a frame's metadata-free wrapper object.
    #[must_use]
    pub fn wrap(&self, frame_json: Value) -> Value {
        serde_json::json!({ "rlh": self, "frame": frame_json })
    }

    /// Detach a header from a wrapper produced by [`wrap`](Self::wrap).
    pub fn unwrap_frame(wrapper: &Value) -> AgpResult<(Self, Value)> {
        let rlh = wrapper
            .get("rlh")
            .cloned()
            .ok_or_else(|| AgpError::Malformed("missing rlh".to_string()))?;
        let frame = wrapper
            .get("frame")
            .cloned()
            .ok_or_else(|| AgpError::Malformed("missing frame".to_string()))?;
        let header: Self =
            serde_json::from_value(rlh).map_err(|e| AgpError::Malformed(e.to_string()))?;
        Ok((header, frame))
    }

    fn mac(&self, key: &[u8]) -> AgpResult<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = String::new();
        let bytes = serde_json::to_value(&unsigned)
            .map_err(|e| AgpError::Malformed(e.to_string()))?
            .to_string();
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| AgpError::Attestation(e.to_string()))?;
        mac.update(bytes.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ttl: u8, tokens: i64, usd: i64) -> RouterLabelHeader {
        RouterLabelHeader::push(
            RouterId::new("dst"),
            "reviewer.code",
            QosTier::Silver,
            ttl,
            tokens,
            usd,
            RlhFlags::default(),
            b"rlh-key",
        )
        .unwrap()
    }

    fn model() -> RlhSection {
        RlhSection {
            alpha: 0.01,
            beta: 5.0,
            gamma: 0.001,
            delta: 2.0,
        }
    }

    #[test]
    fn test_push_verify_round_trip() {
        let h = header(8, 1000, 1000);
        assert!(h.verify(b"rlh-key").is_ok());
        assert!(h.verify(b"wrong").is_err());
    }

    #[test]
    fn test_hop_charges_declared_overhead() {
        let mut h = header(8, 1000, 1000);
        h.hop(100, &model(), b"rlh-key").unwrap();
        // ceil(0.01 * 100 + 5) = 6 tokens, ceil(0.001 * 100 + 2) = 3 usd.
        assert_eq!(h.ttl, 7);
        assert_eq!(h.budget_tokens, 994);
        assert_eq!(h.budget_usd_micros, 997);
        // Re-MAC'd after the hop.
        assert!(h.verify(b"rlh-key").is_ok());
    }

    #[test]
    fn test_budget_exhaustion_drops() {
        let mut h = header(8, 5, 1000);
        assert!(matches!(
            h.hop(100, &model(), b"rlh-key"),
            Err(AgpError::BudgetExhaustedInTransit { .. })
        ));
    }

    #[test]
    fn test_ttl_zero_drops() {
        let mut h = header(1, 1000, 1000);
        h.hop(10, &model(), b"rlh-key").unwrap();
        assert_eq!(h.ttl, 0);
        assert!(matches!(
            h.hop(10, &model(), b"rlh-key"),
            Err(AgpError::TtlExpired)
        ));
    }

    #[test]
    fn test_wrap_unwrap() {
        let h = header(4, 100, 100);
        let frame_json = serde_json::json!({ "v": 1, "payload": { "type": "heartbeat" } });
        let wrapped = h.wrap(frame_json.clone());
        let (back, frame) = RouterLabelHeader::unwrap_frame(&wrapped).unwrap();
        assert_eq!(back, h);
        assert_eq!(frame, frame_json);
    }
}
