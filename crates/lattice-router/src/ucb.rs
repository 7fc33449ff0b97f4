//! UCB reordering of candidate plans.
//!
//! `score = success_rate / avg_cost + c * sqrt(ln(N) / n)` where `N` is
//! total calls in the cluster and `n` the model's calls. Unseen candidates
//! get an unbounded exploration term and rank first among equals.

use lattice_core::ClusterId;
use lattice_telemetry::MetricsRegistry;
use tracing::trace;

use crate::plan::CandidatePlan;
use crate::stats::StatsStore;

/// Default exploration constant.
pub const DEFAULT_EXPLORATION: f64 = 1.4;

/// Reorder a plan's candidates by UCB score (descending). With no recorded
/// calls for the cluster the plan is left in cost order.
pub fn reorder_by_ucb(
    plan: &mut CandidatePlan,
    stats: &StatsStore,
    exploration: f64,
    metrics: &MetricsRegistry,
) {
    let cluster = plan.cluster_hint.clone();
    let total_calls = stats.cluster_calls(&cluster);
    if total_calls == 0 {
        return;
    }

    let mut scored: Vec<(f64, usize)> = plan
        .candidates
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let (score, exploit, explore) =
                score(&cluster, stats, total_calls, exploration, entry);
            emit_gauges(metrics, entry.model_id.as_str(), score, exploit, explore);
            trace!(model = %entry.model_id, score, exploit, explore, "ucb scored");
            (score, idx)
        })
        .collect();

    // Stable by original (cost) order among ties.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let reordered = scored
        .iter()
        .map(|&(_, idx)| plan.candidates[idx].clone())
        .collect();
    plan.candidates = reordered;
}

fn score(
    cluster: &ClusterId,
    stats: &StatsStore,
    total_calls: u64,
    exploration: f64,
    entry: &crate::registry::ModelEntry,
) -> (f64, f64, f64) {
    match stats.get(cluster, &entry.model_id) {
        Some(s) if s.calls > 0 => {
            let avg_cost = s.avg_cost().max(1e-9);
            let exploit = s.success_rate() / avg_cost;
            let explore =
                exploration * ((total_calls as f64).ln() / s.calls as f64).sqrt();
            (exploit + explore, exploit, explore)
        },
        // Unseen in this cluster: exploration dominates any seen score.
        _ => (f64::INFINITY, 0.0, f64::INFINITY),
    }
}

fn emit_gauges(metrics: &MetricsRegistry, model: &str, score: f64, exploit: f64, explore: f64) {
    let clamp = |v: f64| if v.is_finite() { v } else { f64::MAX };
    metrics
        .gauge_with("ucb_score", &[("model", model)])
        .set(clamp(score));
    metrics
        .gauge_with("ucb_exploit", &[("model", model)])
        .set(clamp(exploit));
    metrics
        .gauge_with("ucb_explore", &[("model", model)])
        .set(clamp(explore));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ModelEntry, ModelStatus, SafetyGrade};
    use lattice_core::ModelId;

    fn entry(id: &str, cost: f64) -> ModelEntry {
        ModelEntry {
            model_id: ModelId::new(id),
            safety_grade: SafetyGrade::B,
            status: ModelStatus::Active,
            capabilities: vec!["qa.short".to_string()],
            est_latency_ms: 100.0,
            est_cost_per_1k_tokens_usd: cost,
            manifest_hash: String::new(),
        }
        .sealed()
        .unwrap()
    }

    fn plan_of(ids: &[(&str, f64)]) -> CandidatePlan {
        CandidatePlan {
            candidates: ids.iter().map(|(id, cost)| entry(id, *cost)).collect(),
            cluster_hint: ClusterId::new("qa.short"),
        }
    }

    #[test]
    fn test_unseen_candidate_ranks_first() {
        let stats = StatsStore::in_memory();
        let cluster = ClusterId::new("qa.short");
        for _ in 0..10 {
            stats.record(&cluster, &ModelId::new("seen"), true, 0.002, 0.3);
        }
        let mut plan = plan_of(&[("seen", 0.1), ("unseen", 0.1)]);
        reorder_by_ucb(&mut plan, &stats, DEFAULT_EXPLORATION, &MetricsRegistry::new());
        assert_eq!(plan.primary().model_id.as_str(), "unseen");
    }

    #[test]
    fn test_cheap_successful_model_beats_costly_one() {
        let stats = StatsStore::in_memory();
        let cluster = ClusterId::new("qa.short");
        for _ in 0..50 {
            stats.record(&cluster, &ModelId::new("cheap"), true, 0.001, 0.3);
            stats.record(&cluster, &ModelId::new("costly"), true, 0.010, 0.3);
        }
        let mut plan = plan_of(&[("costly", 0.9), ("cheap", 0.1)]);
        reorder_by_ucb(&mut plan, &stats, DEFAULT_EXPLORATION, &MetricsRegistry::new());
        assert_eq!(plan.primary().model_id.as_str(), "cheap");
    }

    #[test]
    fn test_no_stats_leaves_cost_order() {
        let stats = StatsStore::in_memory();
        let mut plan = plan_of(&[("a", 0.1), ("b", 0.2)]);
        reorder_by_ucb(&mut plan, &stats, DEFAULT_EXPLORATION, &MetricsRegistry::new());
        assert_eq!(plan.primary().model_id.as_str(), "a");
    }

    #[test]
    fn test_gauges_emitted_per_candidate() {
        let stats = StatsStore::in_memory();
        let cluster = ClusterId::new("qa.short");
        stats.record(&cluster, &ModelId::new("a"), true, 0.002, 0.3);
        let metrics = MetricsRegistry::new();
        let mut plan = plan_of(&[("a", 0.1)]);
        reorder_by_ucb(&mut plan, &stats, DEFAULT_EXPLORATION, &metrics);
        let snap = metrics.snapshot();
        assert!(snap.gauges.contains_key("ucb_score{model=a}"));
        assert!(snap.gauges.contains_key("ucb_exploit{model=a}"));
        assert!(snap.gauges.contains_key("ucb_explore{model=a}"));
    }
}
