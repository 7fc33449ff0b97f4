//! AIMD congestion windows per peer.
//!
//! Additive increase on positive feedback (ACK within SLO), multiplicative
//! decrease on ECN mark or timeout. ECN reacts identically to a timeout.

use dashmap::DashMap;
use lattice_config::AimdSection;
use tracing::debug;

/// Per-peer AIMD state.
pub struct AimdController {
    windows: DashMap<String, u32>,
    min_cwnd: u32,
    additive_inc: u32,
    mul_dec_factor: f64,
    /// Latency above which an ACK no longer counts as positive feedback.
    slo_ms: f64,
}

impl AimdController {
    /// Create a controller from config.
    #[must_use]
    pub fn new(config: &AimdSection, slo_ms: f64) -> Self {
        Self {
            windows: DashMap::new(),
            min_cwnd: config.min_cwnd,
            additive_inc: config.additive_inc,
            mul_dec_factor: config.mul_dec_factor,
            slo_ms,
        }
    }

    /// Current congestion window for a peer (created at `min_cwnd`).
    #[must_use]
    pub fn cwnd(&self, peer: &str) -> u32 {
        *self
            .windows
            .entry(peer.to_string())
            .or_insert(self.min_cwnd)
    }

    /// Apply feedback for a peer.
    ///
    /// `ok` is the transport-level outcome; `ecn` marks explicit
    /// congestion. A slow ACK (`latency_ms > slo`) neither grows nor
    /// shrinks the window.
    pub fn feedback(&self, peer: &str, latency_ms: f64, ok: bool, ecn: bool) -> u32 {
        let mut entry = self
            .windows
            .entry(peer.to_string())
            .or_insert(self.min_cwnd);
        let before = *entry;
        if !ok || ecn {
            let decreased = (f64::from(before) * self.mul_dec_factor).floor() as u32;
            *entry = decreased.max(self.min_cwnd);
        } else if latency_ms <= self.slo_ms {
            *entry = before.saturating_add(self.additive_inc);
        }
        if *entry != before {
            debug!(peer, before, after = *entry, ecn, ok, "aimd window adjusted");
        }
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AimdController {
        AimdController::new(&AimdSection::default(), 500.0)
    }

    #[test]
    fn test_additive_increase_within_slo() {
        let c = controller();
        assert_eq!(c.cwnd("peer"), 1);
        c.feedback("peer", 100.0, true, false);
        c.feedback("peer", 100.0, true, false);
        assert_eq!(c.cwnd("peer"), 3);
    }

    #[test]
    fn test_multiplicative_decrease_on_timeout() {
        let c = controller();
        for _ in 0..7 {
            c.feedback("peer", 10.0, true, false);
        }
        assert_eq!(c.cwnd("peer"), 8);
        c.feedback("peer", 10.0, false, false);
        assert_eq!(c.cwnd("peer"), 4);
    }

    #[test]
    fn test_ecn_reacts_identically_to_timeout() {
        let a = controller();
        let b = controller();
        for _ in 0..5 {
            a.feedback("p", 10.0, true, false);
            b.feedback("p", 10.0, true, false);
        }
        a.feedback("p", 10.0, true, true);
        b.feedback("p", 10.0, false, false);
        assert_eq!(a.cwnd("p"), b.cwnd("p"));
    }

    #[test]
    fn test_window_never_below_min() {
        let c = controller();
        for _ in 0..10 {
            c.feedback("peer", 10.0, false, false);
        }
        assert_eq!(c.cwnd("peer"), 1);
    }

    #[test]
    fn test_slow_ack_is_neutral() {
        let c = controller();
        c.feedback("peer", 10.0, true, false);
        let before = c.cwnd("peer");
        c.feedback("peer", 10_000.0, true, false);
        assert_eq!(c.cwnd("peer"), before);
    }
}
