//! UPDATE application: announcements and withdrawals into the RIB.

use lattice_core::RouterId;
use std::time::Instant;
use tracing::{debug, warn};

use crate::dampening::FlapDampener;
use crate::error::{AgpError, AgpResult};
use crate::message::RouteAnnouncement;
use crate::rib::Rib;
use crate::route::Prefix;

/// Counters from applying one UPDATE.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Routes installed into the RIB.
    pub installed: usize,
    /// Announcements rejected by loop prevention.
    pub loops_prevented: usize,
    /// Announcements skipped because the prefix is suppressed.
    pub suppressed: usize,
    /// Prefixes withdrawn.
    pub withdrawn: usize,
}

/// Apply an UPDATE from a peer: withdraw first, then announce.
///
/// Announcement processing order: attestation validation, flap dampening,
/// loop prevention, then RIB insert. Loop-prevented routes are counted
/// rather than failing the whole UPDATE.
///
/// # Errors
///
/// Returns `EATTEST` when an announcement carries an invalid attestation;
/// nothing later in the UPDATE is applied in that case.
pub fn apply_update(
    rib: &Rib,
    dampener: &FlapDampener,
    peer: &RouterId,
    announce: &[RouteAnnouncement],
    withdraw: &[Prefix],
    now: Instant,
) -> AgpResult<UpdateOutcome> {
    let mut outcome = UpdateOutcome::default();

    for prefix in withdraw {
        if rib.withdraw(peer, prefix)? {
            outcome.withdrawn += 1;
            dampener.record_flap(prefix, now);
        }
    }

    for announcement in announce {
        let route = &announcement.route;
        if let Some(attestation) = &announcement.attestation {
            // Signature verification happens at the transport; here an
            // empty blob is the only locally detectable forgery.
            if attestation.is_empty() {
                return Err(AgpError::Attestation(format!(
                    "empty attestation for {}",
                    route.prefix
                )));
            }
        }
        if dampener.is_suppressed(&route.prefix, now) {
            debug!(prefix = %route.prefix, "announcement skipped, prefix suppressed");
            outcome.suppressed += 1;
            continue;
        }
        match rib.insert(peer, route.clone()) {
            Ok(()) => outcome.installed += 1,
            Err(AgpError::LoopPrevented { .. }) => outcome.loops_prevented += 1,
            Err(e) => {
                warn!(prefix = %route.prefix, error = %e, "announcement failed");
                return Err(e);
            },
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::tests::route_to;
    use lattice_core::Adn;
    use lattice_telemetry::MetricsRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    fn rib() -> Rib {
        Rib::new(
            Adn(64512),
            RouterId::new("local"),
            Some(7),
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn announcement(prefix: &str, path: &[Adn]) -> RouteAnnouncement {
        RouteAnnouncement {
            route: route_to(prefix, path, "peer-1"),
            attestation: Some("att-blob".to_string()),
        }
    }

    #[test]
    fn test_mixed_update() {
        let rib = rib();
        let dampener = FlapDampener::new(Duration::from_secs(900));
        let peer = RouterId::new("peer-1");
        let now = Instant::now();

        let outcome = apply_update(
            &rib,
            &dampener,
            &peer,
            &[
                announcement("reviewer.*", &[Adn(65001)]),
                announcement("writer.*", &[Adn(64512)]),
            ],
            &[],
            now,
        )
        .unwrap();
        assert_eq!(outcome.installed, 1);
        assert_eq!(outcome.loops_prevented, 1);
        assert_eq!(rib.len(), 1);

        let outcome = apply_update(
            &rib,
            &dampener,
            &peer,
            &[],
            &[Prefix::new("reviewer.*")],
            now,
        )
        .unwrap();
        assert_eq!(outcome.withdrawn, 1);
        assert!(rib.is_empty());
    }

    #[test]
    fn test_empty_attestation_rejected() {
        let rib = rib();
        let dampener = FlapDampener::new(Duration::from_secs(900));
        let mut bad = announcement("reviewer.*", &[Adn(65001)]);
        bad.attestation = Some(String::new());
        assert!(matches!(
            apply_update(
                &rib,
                &dampener,
                &RouterId::new("peer-1"),
                &[bad],
                &[],
                Instant::now()
            ),
            Err(AgpError::Attestation(_))
        ));
    }

    #[test]
    fn test_suppressed_prefix_skipped() {
        let rib = rib();
        let dampener = FlapDampener::new(Duration::from_secs(900));
        let peer = RouterId::new("peer-1");
        let now = Instant::now();
        let prefix = Prefix::new("flappy.*");
        for _ in 0..4 {
            dampener.record_flap(&prefix, now);
        }
        let outcome = apply_update(
            &rib,
            &dampener,
            &peer,
            &[announcement("flappy.*", &[Adn(65001)])],
            &[],
            now,
        )
        .unwrap();
        assert_eq!(outcome.suppressed, 1);
        assert!(rib.is_empty());
    }
}
