//! Lattice Dispatch - The adapter RPC boundary.
//!
//! This crate provides:
//! - The [`Adapter`] trait (`estimate` / `stream` / `health`) all model and
//!   tool back-ends implement
//! - The adapter pool with per-adapter circuit breakers
//! - Scripted adapters for tests
//!
//! Compliance with the capability set is checked at registration, not at
//! call time; the router never discovers a missing method mid-request.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod adapter;
pub mod circuit;
mod error;
pub mod pool;
pub mod testing;

pub use adapter::{Adapter, AdapterChunk, AdapterHealth, ChunkStream, CostEstimate};
pub use circuit::{CircuitBreaker, CircuitState};
pub use error::{DispatchError, DispatchResult};
pub use pool::AdapterPool;
