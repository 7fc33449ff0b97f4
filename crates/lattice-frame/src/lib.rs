//! Lattice Frame - The ATP wire codec.
//!
//! This crate provides:
//! - The [`Frame`] model and its payload variants
//! - Canonical JSON encoding (sorted keys, compact separators, `sig` excluded)
//! - HMAC-SHA256 frame signatures with a rotating key manager
//! - A TTL-bounded nonce store for replay rejection
//! - Fragmentation and reassembly with per-fragment checksums

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod canonical;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod replay;
pub mod signing;

pub use canonical::{canonical_bytes, canonical_string};
pub use error::{FrameError, FrameResult};
pub use fragment::{fragment, fragment_checksum, ReassembleOutcome, Reassembler};
pub use frame::{
    ControlStatus, Frame, FrameFlags, FrameMetadata, Payload, PayloadKind, TripletWindow,
    PROTOCOL_VERSION,
};
pub use replay::NonceStore;
pub use signing::{FrameSignature, KeyManager};
