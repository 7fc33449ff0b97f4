//! Candidate planning.
//!
//! Planning filters the registry (safety grade, status, capability, cost
//! ceiling), sorts by estimated cost ascending, takes the cheapest model
//! predicted to meet quality/latency as the primary, and keeps the rest as
//! the escalation chain. The plan is also rendered as a `plan` payload for
//! the client.

use lattice_core::{ClusterId, ModelId};
use serde_json::json;
use tracing::debug;

use crate::error::{RouterError, RouterResult};
use crate::registry::{ModelEntry, ModelRegistry, ModelStatus, SafetyGrade};

/// A routing request as seen by the planner.
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    /// Task type to serve.
    pub task_type: String,
    /// Task cluster for statistics.
    pub cluster_hint: ClusterId,
    /// Quality target (`"fast"`, `"balanced"`, `"best"`).
    pub quality_target: String,
    /// Latency SLO in milliseconds.
    pub latency_slo_ms: f64,
    /// Cost ceiling in USD (per request, at the estimated token volume).
    pub cost_ceiling_usd: f64,
    /// Minimum acceptable safety grade.
    pub safety_level: SafetyGrade,
    /// Expected token volume used to price candidates.
    pub expected_tokens: u64,
}

impl RoutingRequest {
    /// Price a model for this request, in USD.
    #[must_use]
    pub fn price(&self, entry: &ModelEntry) -> f64 {
        entry.est_cost_per_1k_tokens_usd * (self.expected_tokens as f64 / 1000.0)
    }
}

/// A ranked candidate plan.
#[derive(Debug, Clone)]
pub struct CandidatePlan {
    /// Primary plus escalation chain, in serving order.
    pub candidates: Vec<ModelEntry>,
    /// Cluster the plan was made for.
    pub cluster_hint: ClusterId,
}

impl CandidatePlan {
    /// The primary candidate.
    #[must_use]
    pub fn primary(&self) -> &ModelEntry {
        &self.candidates[0]
    }

    /// The escalation chain after the primary.
    #[must_use]
    pub fn escalation_chain(&self) -> &[ModelEntry] {
        &self.candidates[1..]
    }

    /// Candidate ids in order.
    #[must_use]
    pub fn candidate_ids(&self) -> Vec<ModelId> {
        self.candidates.iter().map(|c| c.model_id.clone()).collect()
    }

    /// Render the `plan` payload body sent to the client.
    #[must_use]
    pub fn to_payload_body(&self) -> serde_json::Value {
        json!({
            "candidates": self.candidates.iter().map(|c| json!({
                "model_id": c.model_id,
                "est_latency_ms": c.est_latency_ms,
                "est_cost_per_1k_tokens_usd": c.est_cost_per_1k_tokens_usd,
            })).collect::<Vec<_>>(),
            "primary": self.primary().model_id,
            "cluster_hint": self.cluster_hint,
        })
    }

    /// The registry cost frontier baseline: the most expensive candidate's
    /// price, used to report `savings_pct` for the served one.
    #[must_use]
    pub fn frontier_price(&self, request: &RoutingRequest) -> f64 {
        self.candidates
            .iter()
            .map(|c| request.price(c))
            .fold(0.0, f64::max)
    }
}

/// Build a candidate plan for a request.
///
/// # Errors
///
/// Returns [`RouterError::NoEligibleModels`] when the filter leaves no
/// candidate.
pub fn plan(registry: &ModelRegistry, request: &RoutingRequest) -> RouterResult<CandidatePlan> {
    let snapshot = registry.snapshot();
    let mut eligible: Vec<ModelEntry> = snapshot
        .iter()
        .filter(|e| e.safety_grade.meets(request.safety_level))
        .filter(|e| matches!(e.status, ModelStatus::Active | ModelStatus::Fallback))
        .filter(|e| e.covers(&request.task_type))
        .filter(|e| request.price(e) <= request.cost_ceiling_usd)
        .cloned()
        .collect();

    if eligible.is_empty() {
        return Err(RouterError::NoEligibleModels {
            task_type: request.task_type.clone(),
        });
    }

    eligible.sort_by(|a, b| {
        request
            .price(a)
            .partial_cmp(&request.price(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // The cheapest candidate predicted to meet latency becomes primary;
    // everything else stays behind it as the escalation chain. When none
    // meets the SLO the cheapest still leads (escalation will correct).
    if let Some(pos) = eligible
        .iter()
        .position(|e| e.est_latency_ms <= request.latency_slo_ms)
    {
        let fit = eligible.remove(pos);
        eligible.insert(0, fit);
    }

    debug!(
        task_type = %request.task_type,
        candidates = eligible.len(),
        primary = %eligible[0].model_id,
        "candidate plan built"
    );
    Ok(CandidatePlan {
        candidates: eligible,
        cluster_hint: request.cluster_hint.clone(),
    })
}
