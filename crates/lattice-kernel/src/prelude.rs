//! Prelude module - commonly used types for convenient import.

pub use crate::error::{KernelError, KernelResult};
pub use crate::kernel::{Kernel, KernelBuilder};
pub use crate::pipeline::{ServeOutcome, ServeRequest};
