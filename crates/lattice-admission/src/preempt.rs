//! Preemption selection under higher-tier demand spikes.
//!
//! Victims release capacity by draining (window clamped to one), never by
//! being killed. Selection order: oldest bronze sessions first, then
//! oldest silver. Gold is never preempted.

use lattice_core::{QosTier, SessionId};
use std::time::Instant;
use tracing::info;

/// A session eligible for preemption.
#[derive(Debug, Clone)]
pub struct PreemptionCandidate {
    /// The session.
    pub session_id: SessionId,
    /// Its tier.
    pub qos: QosTier,
    /// When the session started (older drains first).
    pub started_at: Instant,
}

/// Select up to `needed` victims from `candidates`.
///
/// Returns the sessions to mark DRAINING, oldest bronze first, then
/// oldest silver.
#[must_use]
pub fn select_victims(candidates: &[PreemptionCandidate], needed: usize) -> Vec<SessionId> {
    if needed == 0 {
        return Vec::new();
    }
    let mut victims = Vec::with_capacity(needed);
    for tier in [QosTier::Bronze, QosTier::Silver] {
        let mut tier_candidates: Vec<&PreemptionCandidate> = candidates
            .iter()
            .filter(|c| c.qos == tier)
            .collect();
        tier_candidates.sort_by_key(|c| c.started_at);
        for candidate in tier_candidates {
            if victims.len() == needed {
                return victims;
            }
            info!(session = %candidate.session_id, qos = %candidate.qos, "preempting session (draining)");
            victims.push(candidate.session_id.clone());
        }
    }
    victims
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Higher `start_offset_s` means a younger session.
    fn candidate(id: &str, qos: QosTier, start_offset_s: u64) -> PreemptionCandidate {
        PreemptionCandidate {
            session_id: SessionId::from_string(id),
            qos,
            started_at: Instant::now() + Duration::from_secs(start_offset_s),
        }
    }

    #[test]
    fn test_oldest_bronze_first() {
        let candidates = vec![
            candidate("silver-old", QosTier::Silver, 0),
            candidate("bronze-young", QosTier::Bronze, 90),
            candidate("bronze-old", QosTier::Bronze, 10),
        ];
        let victims = select_victims(&candidates, 2);
        assert_eq!(victims[0].0, "bronze-old");
        assert_eq!(victims[1].0, "bronze-young");
    }

    #[test]
    fn test_silver_after_bronze_exhausted() {
        let candidates = vec![
            candidate("silver-a", QosTier::Silver, 30),
            candidate("bronze-a", QosTier::Bronze, 5),
        ];
        let victims = select_victims(&candidates, 2);
        assert_eq!(victims[0].0, "bronze-a");
        assert_eq!(victims[1].0, "silver-a");
    }

    #[test]
    fn test_gold_never_selected() {
        let candidates = vec![candidate("gold-a", QosTier::Gold, 500)];
        assert!(select_victims(&candidates, 3).is_empty());
    }

    #[test]
    fn test_zero_needed_is_empty() {
        let candidates = vec![candidate("bronze-a", QosTier::Bronze, 5)];
        assert!(select_victims(&candidates, 0).is_empty());
    }
}
