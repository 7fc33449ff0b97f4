//! Prelude module - commonly used types for convenient import.

pub use crate::canonical::{canonical_bytes, canonical_string};
pub use crate::error::{FrameError, FrameResult};
pub use crate::fragment::{fragment, fragment_checksum, ReassembleOutcome, Reassembler};
pub use crate::frame::{
    ControlStatus, Frame, FrameFlags, FrameMetadata, Payload, PayloadKind, TripletWindow,
};
pub use crate::replay::NonceStore;
pub use crate::signing::{FrameSignature, KeyManager};
