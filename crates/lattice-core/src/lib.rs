//! Lattice Core - Foundation types for the Lattice AI request control plane.
//!
//! This crate provides:
//! - Identifier newtypes shared across the data, decision, and federation planes
//! - QoS tiers and their strict priority ordering
//! - The stable error-code taxonomy surfaced on the wire
//! - Timestamp wrapper for consistent wall-clock handling

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod error;
pub mod ids;
pub mod policy;
pub mod qos;
pub mod types;

pub use error::{ErrorCode, ErrorDetail};
pub use ids::{AdapterId, Adn, ClusterId, ModelId, RouterId, SessionId, StreamId};
pub use policy::{AllowAllPolicy, PolicyDecision, PolicyEngine, PolicyInput};
pub use qos::QosTier;
pub use types::Timestamp;
