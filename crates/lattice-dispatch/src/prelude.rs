//! Prelude module - commonly used types for convenient import.

pub use crate::adapter::{Adapter, AdapterChunk, AdapterHealth, ChunkStream, CostEstimate};
pub use crate::circuit::{CircuitBreaker, CircuitState};
pub use crate::error::{DispatchError, DispatchResult};
pub use crate::pool::AdapterPool;
