//! Lattice Router - The decision engine.
//!
//! This crate provides:
//! - The model registry (manifest hashes, copy-on-write snapshots, atomic
//!   lifecycle writes)
//! - Routing statistics per `(cluster, model)`
//! - Candidate planning (cheapest acceptable primary + escalation chain)
//! - UCB reordering balancing exploitation and exploration
//! - Escalation signals over partial streams
//! - Seeded deterministic shadow evaluation
//! - The promotion/demotion FSM with hysteresis and custody logging
//! - The pluggable success validator

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

mod error;
pub mod escalate;
pub mod plan;
pub mod promotion;
pub mod registry;
pub mod shadow;
pub mod stats;
pub mod ucb;
pub mod validator;

pub use error::{RouterError, RouterResult};
pub use escalate::{EscalationConfig, EscalationSignal, StreamProbe};
pub use plan::{plan, CandidatePlan, RoutingRequest};
pub use promotion::LifecycleEngine;
pub use registry::{ModelEntry, ModelRegistry, ModelStatus, SafetyGrade};
pub use shadow::{shadow_observation, ShadowObservation};
pub use stats::{ModelStats, StatsStore};
pub use ucb::reorder_by_ucb;
pub use validator::{record_verdict, BasicValidator, SuccessValidator, ValidationVerdict};
