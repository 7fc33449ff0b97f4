//! Lattice Session - Per-session and per-stream data-plane state.
//!
//! This crate provides:
//! - The stream state machine (`INIT → ADMITTED → STREAMING ⇄ PAUSED →
//!   FINALIZED | FAILED | REJECTED`)
//! - ACK/NACK bookkeeping over the frame reassembler
//! - The heartbeat scheduler (HB emission, idle FIN)
//! - Single-use TTL resumption tokens
//! - The pluggable external reassembly store contract
//! - The sharded session map owning all live sessions

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

mod error;
pub mod heartbeat;
pub mod resume;
pub mod session;
pub mod store;
pub mod stream;
pub mod table;

pub use error::{SessionError, SessionResult};
pub use heartbeat::{HeartbeatAction, HeartbeatScheduler};
pub use resume::ResumeTokenStore;
pub use session::{ConsistencyClass, SessionMap, SessionRecord};
pub use store::{InMemoryReassemblyStore, ReassemblyStore};
pub use stream::{FragmentEvent, StreamMachine, StreamPhase};
pub use table::{InMemorySessionTable, SessionTable};
