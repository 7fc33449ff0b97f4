//! Canonical JSON form of a frame.
//!
//! Canonical bytes are the input to signing and verification: keys sorted,
//! compact separators, and the `sig` field excluded. `serde_json` maps are
//! `BTreeMap`-backed, so serializing through [`serde_json::Value`] yields
//! sorted keys; compactness is the default.

use serde_json::Value;

use crate::error::{FrameError, FrameResult};
use crate::frame::Frame;

/// Canonical JSON string of a frame, with `sig` excluded.
pub fn canonical_string(frame: &Frame) -> FrameResult<String> {
    let mut value =
        serde_json::to_value(frame).map_err(|e| FrameError::BadFrame(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.remove("sig");
    }
    Ok(value.to_string())
}

/// Canonical bytes of a frame, the input to HMAC signing.
pub fn canonical_bytes(frame: &Frame) -> FrameResult<Vec<u8>> {
    canonical_string(frame).map(String::into_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Payload;
    use crate::signing::KeyManager;
    use lattice_core::{QosTier, SessionId, StreamId};

    fn frame() -> Frame {
        Frame::new(
            SessionId::from_string("s1"),
            StreamId::from_string("r1"),
            3,
            QosTier::Gold,
            Payload::partial("canonical", 0.5),
        )
    }

    #[test]
    fn test_keys_are_sorted_and_compact() {
        let text = canonical_string(&frame()).unwrap();
        // No whitespace separators.
        assert!(!text.contains(": "));
        assert!(!text.contains(", "));
        // Top-level keys appear in sorted order.
        let frag = text.find("\"frag_seq\"").unwrap();
        let msg = text.find("\"msg_seq\"").unwrap();
        let v = text.find("\"v\"").unwrap();
        assert!(frag < msg && msg < v);
    }

    #[test]
    fn test_sig_excluded_from_canonical_form() {
        let keys = KeyManager::seeded([("k1", b"secret".as_slice())]);
        let mut f = frame();
        let unsigned = canonical_string(&f).unwrap();
        f.sig = Some(keys.sign(&f).unwrap());
        let signed = canonical_string(&f).unwrap();
        assert_eq!(unsigned, signed);
    }
}
