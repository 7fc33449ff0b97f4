//! The routing information base.
//!
//! One read-write lock: path selection takes read, UPDATE/WITHDRAW take
//! write. Loop prevention rejects a route whose path contains the local
//! ADN, whose cluster list carries the local cluster id, or whose
//! originator equals the local router id.

use lattice_core::{Adn, RouterId};
use lattice_telemetry::MetricsRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::error::{AgpError, AgpResult};
use crate::route::{Prefix, Route};

/// The RIB, keyed by prefix; each prefix holds the candidate routes by
/// advertising peer.
pub struct Rib {
    local_adn: Adn,
    local_router_id: RouterId,
    local_cluster_id: Option<u32>,
    routes: RwLock<HashMap<Prefix, Vec<(RouterId, Route)>>>,
    metrics: Arc<MetricsRegistry>,
}

impl Rib {
    /// Create a RIB for the local router identity.
    #[must_use]
    pub fn new(
        local_adn: Adn,
        local_router_id: RouterId,
        local_cluster_id: Option<u32>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            local_adn,
            local_router_id,
            local_cluster_id,
            routes: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Insert an announced route from a peer, applying loop prevention.
    ///
    /// # Errors
    ///
    /// Returns [`AgpError::LoopPrevented`] naming the triggered rule; the
    /// caller treats this as a rejected (not fatal) announcement.
    pub fn insert(&self, peer: &RouterId, route: Route) -> AgpResult<()> {
        if route.path.contains(&self.local_adn) {
            return self.reject_loop(&route, "path contains local adn");
        }
        if let Some(local_cluster) = self.local_cluster_id {
            if route.cluster_list.contains(&local_cluster) {
                return self.reject_loop(&route, "cluster_list contains local cluster");
            }
        }
        if route.originator_id.as_ref() == Some(&self.local_router_id) {
            return self.reject_loop(&route, "originator is local router");
        }

        let mut routes = self.routes.write().map_err(|_| AgpError::poisoned())?;
        let candidates = routes.entry(route.prefix.clone()).or_default();
        // Replace any previous advertisement from the same peer.
        candidates.retain(|(advertiser, _)| advertiser != peer);
        debug!(prefix = %route.prefix, peer = %peer, "route installed");
        candidates.push((peer.clone(), route));
        Ok(())
    }

    /// Withdraw a prefix advertised by a peer.
    pub fn withdraw(&self, peer: &RouterId, prefix: &Prefix) -> AgpResult<bool> {
        let mut routes = self.routes.write().map_err(|_| AgpError::poisoned())?;
        let Some(candidates) = routes.get_mut(prefix) else {
            return Ok(false);
        };
        let before = candidates.len();
        candidates.retain(|(advertiser, _)| advertiser != peer);
        let removed = candidates.len() != before;
        if candidates.is_empty() {
            routes.remove(prefix);
        }
        if removed {
            info!(prefix = %prefix, peer = %peer, "route withdrawn");
        }
        Ok(removed)
    }

    /// Drop every route advertised by a peer (session loss).
    pub fn drop_peer(&self, peer: &RouterId) -> AgpResult<usize> {
        let mut routes = self.routes.write().map_err(|_| AgpError::poisoned())?;
        let mut dropped = 0;
        routes.retain(|_, candidates| {
            let before = candidates.len();
            candidates.retain(|(advertiser, _)| advertiser != peer);
            dropped += before - candidates.len();
            !candidates.is_empty()
        });
        Ok(dropped)
    }

    /// Candidate routes whose prefix covers an agent name.
    #[must_use]
    pub fn candidates_for(&self, agent: &str) -> Vec<Route> {
        self.routes
            .read()
            .map(|routes| {
                routes
                    .iter()
                    .filter(|(prefix, _)| prefix.matches(agent))
                    .flat_map(|(_, candidates)| candidates.iter().map(|(_, r)| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All installed routes (snapshot).
    #[must_use]
    pub fn snapshot(&self) -> Vec<Route> {
        self.routes
            .read()
            .map(|routes| {
                routes
                    .values()
                    .flat_map(|candidates| candidates.iter().map(|(_, r)| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of installed routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes
            .read()
            .map(|routes| routes.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// True when the RIB is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reject_loop(&self, route: &Route, rule: &str) -> AgpResult<()> {
        self.metrics.counter("agp_loops_prevented_total").inc();
        info!(prefix = %route.prefix, rule, "route rejected by loop prevention");
        Err(AgpError::LoopPrevented {
            prefix: route.prefix.clone(),
            rule: rule.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::route::{RouteCapacity, RouteCost, RouteHealth, RoutePredictability};
    use chrono::Utc;
    use lattice_core::QosTier;

    pub(crate) fn route_to(prefix: &str, path: &[Adn], next_hop: &str) -> Route {
        Route {
            prefix: Prefix::new(prefix),
            path: path.to_vec(),
            next_hop: RouterId::new(next_hop),
            local_pref: 100,
            med: 0,
            qos_supported: vec![QosTier::Gold, QosTier::Silver, QosTier::Bronze],
            capacity: RouteCapacity {
                max_parallel: 16,
                tokens_per_s: 10_000,
                usd_per_s: 0.1,
            },
            health: RouteHealth {
                p50_ms: 80.0,
                p95_ms: 200.0,
                err_rate: 0.01,
            },
            cost: RouteCost { usd_per_1k: 0.4 },
            predictability: RoutePredictability {
                mape_7d: 0.1,
                under_rate_7d: 0.2,
            },
            security_groups: Vec::new(),
            communities: Vec::new(),
            regions: vec!["eu-1".to_string()],
            valid_until: Utc::now() + chrono::Duration::hours(1),
            metrics_timestamp: Utc::now(),
            metrics_half_life_s: 300.0,
            stability_class: None,
            originator_id: None,
            cluster_list: Vec::new(),
        }
    }

    fn rib() -> Rib {
        Rib::new(
            Adn(64512),
            RouterId::new("local"),
            Some(7),
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let rib = rib();
        let peer = RouterId::new("peer-1");
        rib.insert(&peer, route_to("reviewer.*", &[Adn(65001)], "peer-1"))
            .unwrap();
        assert_eq!(rib.candidates_for("reviewer.code").len(), 1);
        assert!(rib.candidates_for("writer.blog").is_empty());
    }

    #[test]
    fn test_loop_prevention_local_adn_in_path() {
        let rib = rib();
        let peer = RouterId::new("peer-1");
        let route = route_to("reviewer.*", &[Adn(65001), Adn(64512), Adn(65002)], "peer-1");
        assert!(matches!(
            rib.insert(&peer, route),
            Err(AgpError::LoopPrevented { .. })
        ));
        assert!(rib.is_empty());
    }

    #[test]
    fn test_loop_prevention_cluster_list() {
        let rib = rib();
        let peer = RouterId::new("peer-1");
        let mut route = route_to("reviewer.*", &[Adn(65001)], "peer-1");
        route.cluster_list = vec![3, 7];
        assert!(rib.insert(&peer, route).is_err());
    }

    #[test]
    fn test_loop_prevention_originator() {
        let rib = rib();
        let peer = RouterId::new("peer-1");
        let mut route = route_to("reviewer.*", &[Adn(65001)], "peer-1");
        route.originator_id = Some(RouterId::new("local"));
        assert!(rib.insert(&peer, route).is_err());
    }

    #[test]
    fn test_loop_rejections_counted() {
        let metrics = Arc::new(MetricsRegistry::new());
        let rib = Rib::new(Adn(64512), RouterId::new("local"), Some(7), Arc::clone(&metrics));
        let peer = RouterId::new("peer-1");
        let _ = rib.insert(&peer, route_to("a.*", &[Adn(64512)], "peer-1"));
        let mut clustered = route_to("b.*", &[Adn(65001)], "peer-1");
        clustered.cluster_list = vec![7];
        let _ = rib.insert(&peer, clustered);
        assert_eq!(metrics.counter_value("agp_loops_prevented_total"), 2);
    }

    #[test]
    fn test_reannouncement_replaces_previous() {
        let rib = rib();
        let peer = RouterId::new("peer-1");
        rib.insert(&peer, route_to("reviewer.*", &[Adn(65001)], "peer-1"))
            .unwrap();
        let mut updated = route_to("reviewer.*", &[Adn(65001)], "peer-1");
        updated.local_pref = 200;
        rib.insert(&peer, updated).unwrap();
        let candidates = rib.candidates_for("reviewer.x");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].local_pref, 200);
    }

    #[test]
    fn test_withdraw_by_prefix_and_peer() {
        let rib = rib();
        let peer_a = RouterId::new("peer-a");
        let peer_b = RouterId::new("peer-b");
        rib.insert(&peer_a, route_to("reviewer.*", &[Adn(65001)], "peer-a"))
            .unwrap();
        rib.insert(&peer_b, route_to("reviewer.*", &[Adn(65002)], "peer-b"))
            .unwrap();
        assert!(rib.withdraw(&peer_a, &Prefix::new("reviewer.*")).unwrap());
        let remaining = rib.candidates_for("reviewer.x");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].next_hop, RouterId::new("peer-b"));
    }

    #[test]
    fn test_drop_peer_clears_all_their_routes() {
        let rib = rib();
        let peer = RouterId::new("peer-1");
        rib.insert(&peer, route_to("a.*", &[Adn(65001)], "peer-1")).unwrap();
        rib.insert(&peer, route_to("b.*", &[Adn(65001)], "peer-1")).unwrap();
        assert_eq!(rib.drop_peer(&peer).unwrap(), 2);
        assert!(rib.is_empty());
    }
}
