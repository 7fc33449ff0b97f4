//! Lattice Audit - Append-only persisted evidence.
//!
//! This crate provides:
//! - The custody log: hash-chained, HMAC'd JSON Lines recording model
//!   lifecycle events (build, scan, sign, deploy, promote, demote)
//! - The observation store: daily JSONL files of routing observations with
//!   idempotent append
//!
//! A custody chain that fails verification halts further writes; reads
//! stay available.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod custody;
mod error;
pub mod observation;

pub use custody::{CustodyEvent, CustodyLog, CustodyRecord};
pub use error::{AuditError, AuditResult};
pub use observation::{ObservationPhase, ObservationRecord, ObservationStore};
