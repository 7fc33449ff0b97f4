//! Lattice AGP - The inter-router federation control plane.
//!
//! Routers exchange reachability and capacity for named agent prefixes
//! (`reviewer.*`) over AGP. This crate provides:
//! - The peer session FSM (`IDLE → CONNECT → OPEN_SENT → OPEN_CONFIRMED →
//!   ESTABLISHED`) with keepalive/hold timers and version negotiation
//! - OPEN/KEEPALIVE/UPDATE/ROUTE_REFRESH/ERROR messages plus the optional
//!   `PersonaStatsUpdate` federation record
//! - The RIB with path-vector loop prevention (local ADN in path,
//!   Route-Reflector originator/cluster lists)
//! - Deterministic path selection with freshness-weighted health and ECMP
//! - Flap dampening with exponential penalty decay
//! - Hold-down and grace timers (mutually exclusive)
//! - The Router Label Header for inter-router data-plane forwarding

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod dampening;
mod error;
pub mod message;
pub mod peer;
pub mod persona;
pub mod rib;
pub mod rlh;
pub mod route;
pub mod selection;
pub mod speaker;
pub mod timers;

pub use dampening::FlapDampener;
pub use error::{AgpError, AgpResult};
pub use message::{AgpErrorCode, AgpMessage, OpenInfo, RouteAnnouncement};
pub use peer::{PeerConfig, PeerEvent, PeerSession, PeerState};
pub use persona::{merge_persona_stats, MergeOutcome, PersonaStatsUpdate};
pub use rib::Rib;
pub use rlh::{RlhFlags, RouterLabelHeader};
pub use route::{Prefix, Route, RouteCapacity, RouteCost, RouteHealth, RoutePredictability};
pub use selection::{select_route, SelectionPolicy, SelectionWeights};
pub use speaker::{apply_update, UpdateOutcome};
pub use timers::PrefixTimers;
