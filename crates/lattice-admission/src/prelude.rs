//! Prelude module - commonly used types for convenient import.

pub use crate::aimd::AimdController;
pub use crate::budget::{BudgetDimension, BurnRate, Estimate, TripletBudget};
pub use crate::error::{AdmissionError, AdmissionResult};
pub use crate::preempt::{select_victims, PreemptionCandidate};
pub use crate::scheduler::{QosScheduler, QueuedRequest};
pub use crate::watermark::{Watermark, WatermarkLevel};
pub use crate::window::WindowUpdateEmitter;
