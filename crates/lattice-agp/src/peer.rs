//! The AGP peer session FSM.
//!
//! `IDLE → CONNECT → OPEN_SENT → OPEN_CONFIRMED → ESTABLISHED`, with
//! `IDLE_ERROR` as the failure parking state. KEEPALIVE cadence comes from
//! the negotiated interval; hold time is three keepalives; missing
//! `max_keepalive_misses` in a row drops the session back to IDLE.

use lattice_core::{Adn, RouterId};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{AgpError, AgpResult};
use crate::message::{AgpErrorCode, AgpMessage, OpenInfo};

/// Protocol major versions this implementation speaks.
pub const SUPPORTED_VERSIONS: [u32; 1] = [1];

/// FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Not started.
    Idle,
    /// Transport connecting.
    Connect,
    /// OPEN sent, awaiting the peer's.
    OpenSent,
    /// Peer's OPEN accepted, awaiting first KEEPALIVE.
    OpenConfirmed,
    /// Session up; UPDATEs flow.
    Established,
    /// Errored; operator or timer restarts.
    IdleError,
}

/// Peer configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Local router id advertised in OPEN.
    pub local_router_id: RouterId,
    /// Local ADN advertised in OPEN.
    pub local_adn: Adn,
    /// Keepalive cadence proposal, seconds.
    pub keepalive_interval: u64,
    /// Tolerated consecutive keepalive misses.
    pub max_keepalive_misses: u32,
    /// Local Route-Reflector cluster id.
    pub rr_cluster_id: Option<u32>,
}

/// What the FSM asks the transport to do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Send this message to the peer.
    Send(AgpMessage),
    /// Session reached ESTABLISHED.
    SessionUp,
    /// Session left ESTABLISHED; drop the peer's routes.
    SessionDown,
}

/// One peer's session state.
pub struct PeerSession {
    peer_id: RouterId,
    config: PeerConfig,
    state: PeerState,
    /// Negotiated keepalive interval (min of both proposals).
    negotiated_keepalive: Duration,
    /// Negotiated protocol major version.
    negotiated_version: Option<u32>,
    last_keepalive_rx: Instant,
    last_keepalive_tx: Instant,
    missed_keepalives: u32,
    /// Peer identity learned from its OPEN.
    peer_adn: Option<Adn>,
    peer_rr_cluster: Option<u32>,
}

impl PeerSession {
    /// Create a session in IDLE.
    #[must_use]
    pub fn new(peer_id: RouterId, config: PeerConfig) -> Self {
        let keepalive = Duration::from_secs(config.keepalive_interval);
        Self {
            peer_id,
            config,
            state: PeerState::Idle,
            negotiated_keepalive: keepalive,
            negotiated_version: None,
            last_keepalive_rx: Instant::now(),
            last_keepalive_tx: Instant::now(),
            missed_keepalives: 0,
            peer_adn: None,
            peer_rr_cluster: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Negotiated protocol version once OPEN completed.
    #[must_use]
    pub fn negotiated_version(&self) -> Option<u32> {
        self.negotiated_version
    }

    /// Hold time: three keepalive intervals.
    #[must_use]
    pub fn hold_time(&self) -> Duration {
        self.negotiated_keepalive.saturating_mul(3)
    }

    /// The peer's ADN, once learned.
    #[must_use]
    pub fn peer_adn(&self) -> Option<Adn> {
        self.peer_adn
    }

    /// START: begin connecting and send our OPEN.
    pub fn start(&mut self, now: Instant) -> AgpResult<Vec<PeerEvent>> {
        if !matches!(self.state, PeerState::Idle | PeerState::IdleError) {
            return Err(AgpError::BadState {
                state: format!("{:?}", self.state),
                event: "START".to_string(),
            });
        }
        self.state = PeerState::Connect;
        self.last_keepalive_rx = now;
        self.missed_keepalives = 0;
        let open = AgpMessage::Open(OpenInfo {
            router_id: self.config.local_router_id.clone(),
            adn: self.config.local_adn,
            versions: SUPPORTED_VERSIONS.to_vec(),
            capabilities: Vec::new(),
            rr_cluster_id: self.config.rr_cluster_id,
            keepalive_interval: self.config.keepalive_interval,
        });
        self.state = PeerState::OpenSent;
        info!(peer = %self.peer_id, "peer session started, OPEN sent");
        Ok(vec![PeerEvent::Send(open)])
    }

    /// Handle an inbound message.
    pub fn handle(&mut self, message: &AgpMessage, now: Instant) -> AgpResult<Vec<PeerEvent>> {
        match message {
            AgpMessage::Open(info) => self.handle_open(info, now),
            AgpMessage::Keepalive => self.handle_keepalive(now),
            AgpMessage::Error { code, detail } => {
                warn!(peer = %self.peer_id, ?code, detail, "peer reported error");
                let was_established = self.state == PeerState::Established;
                self.state = PeerState::IdleError;
                Ok(if was_established {
                    vec![PeerEvent::SessionDown]
                } else {
                    Vec::new()
                })
            },
            AgpMessage::Update { .. }
            | AgpMessage::RouteRefresh
            | AgpMessage::PersonaStatsUpdate(_) => {
                if self.state != PeerState::Established {
                    return Err(AgpError::BadState {
                        state: format!("{:?}", self.state),
                        event: "UPDATE".to_string(),
                    });
                }
                // Routing content is handled by the speaker; arrival counts
                // as liveness.
                self.last_keepalive_rx = now;
                Ok(Vec::new())
            },
        }
    }

    /// Timer tick: emit KEEPALIVE on cadence, count misses, drop the
    /// session when the hold time lapses.
    pub fn tick(&mut self, now: Instant) -> Vec<PeerEvent> {
        if self.state != PeerState::Established {
            return Vec::new();
        }
        let mut events = Vec::new();
        if now.duration_since(self.last_keepalive_tx) >= self.negotiated_keepalive {
            self.last_keepalive_tx = now;
            events.push(PeerEvent::Send(AgpMessage::Keepalive));
        }
        let silent_for = now.duration_since(self.last_keepalive_rx);
        let misses = (silent_for.as_secs() / self.negotiated_keepalive.as_secs().max(1)) as u32;
        if misses != self.missed_keepalives {
            self.missed_keepalives = misses;
        }
        if silent_for >= self.hold_time() || misses >= self.config.max_keepalive_misses {
            warn!(peer = %self.peer_id, misses, "hold time expired, session down");
            self.state = PeerState::Idle;
            self.missed_keepalives = 0;
            events.push(PeerEvent::SessionDown);
        }
        events
    }

    fn handle_open(&mut self, info: &OpenInfo, now: Instant) -> AgpResult<Vec<PeerEvent>> {
        if !matches!(self.state, PeerState::OpenSent | PeerState::Connect) {
            return Err(AgpError::BadState {
                state: format!("{:?}", self.state),
                event: "OPEN".to_string(),
            });
        }
        // Negotiate the minimum compatible major version.
        let negotiated = SUPPORTED_VERSIONS
            .iter()
            .filter(|v| info.versions.contains(v))
            .min()
            .copied();
        let Some(version) = negotiated else {
            self.state = PeerState::IdleError;
            return Ok(vec![PeerEvent::Send(AgpMessage::Error {
                code: AgpErrorCode::Config,
                detail: "no compatible protocol version".to_string(),
            })]);
        };
        self.negotiated_version = Some(version);
        self.negotiated_keepalive = Duration::from_secs(
            self.config.keepalive_interval.min(info.keepalive_interval).max(1),
        );
        self.peer_adn = Some(info.adn);
        self.peer_rr_cluster = info.rr_cluster_id;
        self.state = PeerState::OpenConfirmed;
        self.last_keepalive_rx = now;
        self.last_keepalive_tx = now;
        info!(peer = %self.peer_id, version, "OPEN accepted");
        Ok(vec![PeerEvent::Send(AgpMessage::Keepalive)])
    }

    fn handle_keepalive(&mut self, now: Instant) -> AgpResult<Vec<PeerEvent>> {
        self.last_keepalive_rx = now;
        self.missed_keepalives = 0;
        match self.state {
            PeerState::OpenConfirmed => {
                self.state = PeerState::Established;
                info!(peer = %self.peer_id, "session established");
                Ok(vec![PeerEvent::SessionUp])
            },
            PeerState::Established => Ok(Vec::new()),
            _ => Err(AgpError::BadState {
                state: format!("{:?}", self.state),
                event: "KEEPALIVE".to_string(),
            }),
        }
    }
}
