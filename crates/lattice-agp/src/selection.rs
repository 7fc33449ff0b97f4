//! Deterministic path selection with ECMP.
//!
//! Among candidate routes to a prefix: (1) policy filter; (2) LOCAL_PREF
//! descending; (3) path length ascending; (4) QoS fit; (5) freshness-
//! weighted health; (6) cost ascending; (7) predictability bonus; (8) ECMP
//! hash on `session_id` for stickiness.

use chrono::{DateTime, Utc};
use lattice_core::{QosTier, SessionId};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::trace;

use crate::route::Route;

/// Policy constraints applied before scoring.
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy {
    /// Required security group (route must carry it), if any.
    pub security_group: Option<String>,
    /// Required region, if any.
    pub region: Option<String>,
    /// Cost ceiling in USD per 1k tokens, if any.
    pub cost_ceiling_usd_per_1k: Option<f64>,
    /// QoS tier the route must support.
    pub qos: QosTier,
}

/// Weights for the health score combination.
#[derive(Debug, Clone, Copy)]
pub struct SelectionWeights {
    /// Weight of `p95_ms` in the health score.
    pub w_latency: f64,
    /// Weight of `err_rate` in the health score.
    pub w_err: f64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            w_latency: 1.0,
            w_err: 1000.0,
        }
    }
}

/// Select the best route for a session, or `None` when every candidate is
/// filtered out.
#[must_use]
pub fn select_route(
    candidates: &[Route],
    policy: &SelectionPolicy,
    weights: SelectionWeights,
    hold_time_s: f64,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Option<Route> {
    // (1) policy filter.
    let mut survivors: Vec<&Route> = candidates
        .iter()
        .filter(|r| !r.expired(now))
        .filter(|r| {
            policy
                .security_group
                .as_ref()
                .map_or(true, |g| r.security_groups.contains(g))
        })
        .filter(|r| {
            policy
                .region
                .as_ref()
                .map_or(true, |region| r.regions.contains(region))
        })
        .filter(|r| {
            policy
                .cost_ceiling_usd_per_1k
                .map_or(true, |ceiling| r.cost.usd_per_1k <= ceiling)
        })
        .filter(|r| r.qos_supported.contains(&policy.qos))
        .collect();
    if survivors.is_empty() {
        return None;
    }

    // (2) LOCAL_PREF descending.
    let best_pref = survivors.iter().map(|r| r.local_pref).max()?;
    survivors.retain(|r| r.local_pref == best_pref);

    // (3) path length ascending.
    let shortest = survivors.iter().map(|r| r.path.len()).min()?;
    survivors.retain(|r| r.path.len() == shortest);

    // (5) freshness-weighted health score, lower is better. Scores within
    // 10% of the best are treated as ties and fall through to cost.
    let health = |r: &Route| {
        let f = r.freshness(now, hold_time_s);
        (weights.w_latency * r.health.p95_ms + weights.w_err * r.health.err_rate * 100.0)
            * f.max(1e-3).recip()
    };
    let best_health = survivors
        .iter()
        .map(|r| health(r))
        .fold(f64::INFINITY, f64::min);
    survivors.retain(|r| health(r) <= best_health * 1.10 + f64::EPSILON);

    // (6) cost ascending, same 10% tie band.
    let best_cost = survivors
        .iter()
        .map(|r| r.cost.usd_per_1k)
        .fold(f64::INFINITY, f64::min);
    survivors.retain(|r| r.cost.usd_per_1k <= best_cost * 1.10 + f64::EPSILON);

    // (7) predictability bonus: lowest mape wins, same tie band.
    let best_mape = survivors
        .iter()
        .map(|r| r.predictability.mape_7d)
        .fold(f64::INFINITY, f64::min);
    survivors.retain(|r| r.predictability.mape_7d <= best_mape * 1.10 + f64::EPSILON);

    // (8) ECMP among the remainder: hash the session id for stickiness.
    let mut hasher = DefaultHasher::new();
    session_id.as_str().hash(&mut hasher);
    let pick = (hasher.finish() as usize) % survivors.len();
    trace!(
        survivors = survivors.len(),
        pick,
        "path selection complete"
    );
    Some(survivors[pick].clone())
}
