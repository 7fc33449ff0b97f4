//! Lattice Kernel - Root context and request pipeline.
//!
//! The kernel owns every process-wide store (metrics, keys, sessions,
//! registry, stats, audit) and hands `Arc` handles to the components it
//! constructs; there are no module-level globals. The serve pipeline runs
//! admission, planning, dispatch with escalation, validation, and
//! observation emission end to end.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

mod error;
mod kernel;
mod pipeline;

pub use error::{KernelError, KernelResult};
pub use kernel::{Kernel, KernelBuilder};
pub use pipeline::{ServeOutcome, ServeRequest};
