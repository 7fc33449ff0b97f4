//! RIB entries and prefix matching.

use chrono::{DateTime, Utc};
use lattice_core::{Adn, QosTier, RouterId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An agent prefix (`reviewer.*`, `qa.short`, `*`).
///
/// Matching is by exact name or a trailing `.*` wildcard segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Prefix(pub String);

impl Prefix {
    /// Wrap a prefix string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Whether this prefix covers an agent name.
    #[must_use]
    pub fn matches(&self, agent: &str) -> bool {
        if self.0 == "*" || self.0 == agent {
            return true;
        }
        self.0
            .strip_suffix(".*")
            .is_some_and(|stem| agent == stem || agent.starts_with(&format!("{stem}.")))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Advertised capacity along a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RouteCapacity {
    /// Maximum concurrent requests.
    pub max_parallel: u32,
    /// Token throughput per second.
    pub tokens_per_s: u64,
    /// Spend throughput per second (USD).
    pub usd_per_s: f64,
}

/// Advertised health along a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RouteHealth {
    /// Median latency in ms.
    pub p50_ms: f64,
    /// Tail latency in ms.
    pub p95_ms: f64,
    /// Error rate (0..1).
    pub err_rate: f64,
}

/// Advertised cost along a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RouteCost {
    /// USD per 1k tokens.
    pub usd_per_1k: f64,
}

/// Advertised estimate predictability along a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RoutePredictability {
    /// 7-day mean absolute percentage error of estimates.
    pub mape_7d: f64,
    /// 7-day rate of under-estimates.
    pub under_rate_7d: f64,
}

/// One RIB entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Destination agent prefix.
    pub prefix: Prefix,
    /// Path vector of traversed domains.
    pub path: Vec<Adn>,
    /// Next-hop router.
    pub next_hop: RouterId,
    /// Local preference (higher wins).
    pub local_pref: u32,
    /// Multi-exit discriminator (lower wins among equal neighbors).
    pub med: u32,
    /// QoS tiers the route supports.
    pub qos_supported: Vec<QosTier>,
    /// Advertised capacity.
    pub capacity: RouteCapacity,
    /// Advertised health.
    pub health: RouteHealth,
    /// Advertised cost.
    pub cost: RouteCost,
    /// Estimate predictability.
    pub predictability: RoutePredictability,
    /// Security groups permitted on the route.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
    /// Opaque communities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communities: Vec<String>,
    /// Serving regions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
    /// Route expiry.
    pub valid_until: DateTime<Utc>,
    /// When the advertised metrics were measured.
    pub metrics_timestamp: DateTime<Utc>,
    /// Half-life for metric freshness weighting, in seconds.
    pub metrics_half_life_s: f64,
    /// Advertised stability class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_class: Option<String>,
    /// Route-Reflector originator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator_id: Option<RouterId>,
    /// Route-Reflector cluster list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_list: Vec<u32>,
}

impl Route {
    /// Freshness factor `exp(-Δt / half_life)` at `now`; routes older than
    /// `hold_time` are stale and weigh zero.
    #[must_use]
    pub fn freshness(&self, now: DateTime<Utc>, hold_time_s: f64) -> f64 {
        let age_s = now
            .signed_duration_since(self.metrics_timestamp)
            .num_milliseconds() as f64
            / 1000.0;
        let age_s = age_s.max(0.0);
        if age_s > hold_time_s {
            return 0.0;
        }
        if self.metrics_half_life_s <= 0.0 {
            return 1.0;
        }
        (-age_s / self.metrics_half_life_s).exp()
    }

    /// Whether the route has expired.
    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matching() {
        let p = Prefix::new("reviewer.*");
        assert!(p.matches("reviewer.code"));
        assert!(p.matches("reviewer.code.rust"));
        assert!(p.matches("reviewer"));
        assert!(!p.matches("reviewers"));
        assert!(!p.matches("writer.code"));

        assert!(Prefix::new("*").matches("anything"));
        assert!(Prefix::new("qa.short").matches("qa.short"));
        assert!(!Prefix::new("qa.short").matches("qa.long"));
    }

    #[test]
    fn test_freshness_decay() {
        let now = Utc::now();
        let mut route = crate::rib::tests::route_to("reviewer.*", &[Adn(65001)], "peer-1");
        route.metrics_half_life_s = 60.0;
        route.metrics_timestamp = now - chrono::Duration::seconds(60);
        let f = route.freshness(now, 300.0);
        assert!((f - (-1.0f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_stale_metrics_weigh_zero() {
        let now = Utc::now();
        let mut route = crate::rib::tests::route_to("reviewer.*", &[Adn(65001)], "peer-1");
        route.metrics_timestamp = now - chrono::Duration::seconds(1000);
        assert!((route.freshness(now, 30.0) - 0.0).abs() < f64::EPSILON);
    }
}
