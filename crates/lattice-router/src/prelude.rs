//! Prelude module - commonly used types for convenient import.

pub use crate::error::{RouterError, RouterResult};
pub use crate::escalate::{EscalationConfig, EscalationSignal, StreamProbe};
pub use crate::plan::{plan, CandidatePlan, RoutingRequest};
pub use crate::promotion::LifecycleEngine;
pub use crate::registry::{ModelEntry, ModelRegistry, ModelStatus, SafetyGrade};
pub use crate::shadow::{shadow_observation, ShadowObservation};
pub use crate::stats::{ModelStats, StatsStore};
pub use crate::ucb::reorder_by_ucb;
pub use crate::validator::{record_verdict, BasicValidator, SuccessValidator, ValidationVerdict};
