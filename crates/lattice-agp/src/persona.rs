//! Federated persona reputation records.
//!
//! Conflict resolution: a higher `sequence_number` from the same origin
//! wins outright; stale sequences are rejected. When two records diverge
//! past the merge threshold, reputation is merged weighted by sample
//! count.

use lattice_core::RouterId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Divergence above which scores are merged rather than replaced.
pub const MERGE_DIVERGENCE_THRESHOLD: f64 = 0.15;

/// One persona reputation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaStatsUpdate {
    /// Persona the record describes.
    pub persona_id: String,
    /// Reputation score (0..1).
    pub reputation_score: f64,
    /// Reliability score (0..1).
    pub reliability_score: f64,
    /// Samples behind the scores.
    pub sample_count: u64,
    /// Unix seconds of the last update at the origin.
    pub last_updated: i64,
    /// Router that originated the record.
    pub router_origin: RouterId,
    /// Monotonic per-origin sequence.
    pub sequence_number: u64,
    /// Signature over the record (verified by the transport layer).
    pub signature: String,
}

/// Outcome of merging an incoming record into a held one.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The incoming record replaced the held one.
    Replaced(PersonaStatsUpdate),
    /// Scores were merged, weighted by sample count.
    Merged(PersonaStatsUpdate),
    /// The incoming record was stale and rejected.
    RejectedStale,
}

/// Merge `incoming` into `held` (for the same persona).
#[must_use]
pub fn merge_persona_stats(
    held: &PersonaStatsUpdate,
    incoming: &PersonaStatsUpdate,
) -> MergeOutcome {
    if incoming.router_origin == held.router_origin {
        // Same origin: strictly newer sequence wins, anything else is stale.
        if incoming.sequence_number > held.sequence_number {
            return MergeOutcome::Replaced(incoming.clone());
        }
        debug!(
            persona = %incoming.persona_id,
            held_seq = held.sequence_number,
            incoming_seq = incoming.sequence_number,
            "stale persona update rejected"
        );
        return MergeOutcome::RejectedStale;
    }

    let divergence = (held.reputation_score - incoming.reputation_score).abs();
    if divergence <= MERGE_DIVERGENCE_THRESHOLD {
        // Close enough: prefer the fresher record.
        return if incoming.last_updated > held.last_updated {
            MergeOutcome::Replaced(incoming.clone())
        } else {
            MergeOutcome::RejectedStale
        };
    }

    // Diverged: weighted merge by sample count.
    let total = (held.sample_count + incoming.sample_count).max(1) as f64;
    let w_held = held.sample_count as f64 / total;
    let w_in = incoming.sample_count as f64 / total;
    let mut merged = incoming.clone();
    merged.reputation_score = held.reputation_score * w_held + incoming.reputation_score * w_in;
    merged.reliability_score =
        held.reliability_score * w_held + incoming.reliability_score * w_in;
    merged.sample_count = held.sample_count + incoming.sample_count;
    merged.last_updated = held.last_updated.max(incoming.last_updated);
    MergeOutcome::Merged(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(origin: &str, seq: u64, reputation: f64, samples: u64) -> PersonaStatsUpdate {
        PersonaStatsUpdate {
            persona_id: "reviewer.code".to_string(),
            reputation_score: reputation,
            reliability_score: 0.9,
            sample_count: samples,
            last_updated: 1_700_000_000 + seq as i64,
            router_origin: RouterId::new(origin),
            sequence_number: seq,
            signature: "sig".to_string(),
        }
    }

    #[test]
    fn test_same_origin_higher_sequence_wins() {
        let held = record("r1", 5, 0.8, 100);
        let incoming = record("r1", 6, 0.6, 100);
        assert_eq!(
            merge_persona_stats(&held, &incoming),
            MergeOutcome::Replaced(incoming)
        );
    }

    #[test]
    fn test_same_origin_stale_sequence_rejected() {
        let held = record("r1", 5, 0.8, 100);
        assert_eq!(
            merge_persona_stats(&held, &record("r1", 5, 0.9, 100)),
            MergeOutcome::RejectedStale
        );
        assert_eq!(
            merge_persona_stats(&held, &record("r1", 4, 0.9, 100)),
            MergeOutcome::RejectedStale
        );
    }

    #[test]
    fn test_divergent_records_merge_weighted() {
        let held = record("r1", 5, 0.9, 300);
        let incoming = record("r2", 2, 0.5, 100);
        match merge_persona_stats(&held, &incoming) {
            MergeOutcome::Merged(merged) => {
                // 0.9 * 0.75 + 0.5 * 0.25 = 0.8.
                assert!((merged.reputation_score - 0.8).abs() < 1e-9);
                assert_eq!(merged.sample_count, 400);
            },
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn test_close_records_prefer_fresher() {
        let held = record("r1", 5, 0.80, 100);
        let mut incoming = record("r2", 1, 0.85, 100);
        incoming.last_updated = held.last_updated + 50;
        assert!(matches!(
            merge_persona_stats(&held, &incoming),
            MergeOutcome::Replaced(_)
        ));
    }
}
