//! Lattice Admission - Budget admission and flow control.
//!
//! This crate provides:
//! - The triplet budget: parallel / tokens / USD-micros checked atomically
//! - A rolling USD burn-rate series
//! - AIMD congestion windows per peer
//! - The strict-priority QoS scheduler with bounded queues
//! - The preemption selector (oldest bronze first, then oldest silver)
//! - The queue-delay watermark driving ECN marks
//! - WINDOW_UPDATE emission policy

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod aimd;
pub mod budget;
mod error;
pub mod preempt;
pub mod scheduler;
pub mod watermark;
pub mod window;

pub use aimd::AimdController;
pub use budget::{BudgetDimension, BurnRate, Estimate, TripletBudget};
pub use error::{AdmissionError, AdmissionResult};
pub use preempt::{select_victims, PreemptionCandidate};
pub use scheduler::{QosScheduler, QueuedRequest};
pub use watermark::{Watermark, WatermarkLevel};
pub use window::WindowUpdateEmitter;
