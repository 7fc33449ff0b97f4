//! Prelude module - commonly used types for convenient import.

pub use crate::dampening::FlapDampener;
pub use crate::error::{AgpError, AgpResult};
pub use crate::message::{AgpErrorCode, AgpMessage, OpenInfo, RouteAnnouncement};
pub use crate::peer::{PeerConfig, PeerEvent, PeerSession, PeerState};
pub use crate::persona::{merge_persona_stats, MergeOutcome, PersonaStatsUpdate};
pub use crate::rib::Rib;
pub use crate::rlh::{RlhFlags, RouterLabelHeader};
pub use crate::route::{Prefix, Route, RouteCapacity, RouteCost, RouteHealth, RoutePredictability};
pub use crate::selection::{select_route, SelectionPolicy, SelectionWeights};
pub use crate::speaker::{apply_update, UpdateOutcome};
pub use crate::timers::PrefixTimers;
