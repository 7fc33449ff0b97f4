//! Prelude module - commonly used types for convenient import.
//!
//! Use `use lattice_core::prelude::*;` to import all essential types.

pub use crate::error::{ErrorCode, ErrorDetail};
pub use crate::ids::{AdapterId, Adn, ClusterId, ModelId, RouterId, SessionId, StreamId};
pub use crate::policy::{AllowAllPolicy, PolicyDecision, PolicyEngine, PolicyInput};
pub use crate::qos::QosTier;
pub use crate::types::Timestamp;
