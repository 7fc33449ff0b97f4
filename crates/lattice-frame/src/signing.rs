//! HMAC-SHA256 frame signatures and the rotating key manager.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::canonical::canonical_bytes;
use crate::error::{FrameError, FrameResult};
use crate::frame::Frame;

type HmacSha256 = Hmac<Sha256>;

/// A frame signature: the signing key's identifier plus the hex MAC over
/// the canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSignature {
    /// Identifier of the key used to sign.
    pub key_id: String,
    /// Hex-encoded HMAC-SHA256.
    pub mac: String,
}

/// In-memory key manager, seeded at startup.
///
/// Keys are looked up by identifier on verification; signing uses the
/// active key. [`rotate`](KeyManager::rotate) replaces a key's secret in
/// place so that frames signed before rotation fail verification, which is
/// the intended revocation behavior.
pub struct KeyManager {
    keys: RwLock<HashMap<String, Vec<u8>>>,
    active: RwLock<String>,
}

impl KeyManager {
    /// Seed the manager with `(key_id, secret)` pairs. The first pair
    /// becomes the active signing key.
    #[must_use]
    pub fn seeded<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let mut keys = HashMap::new();
        let mut active = String::new();
        for (id, secret) in pairs {
            if active.is_empty() {
                active = id.to_string();
            }
            keys.insert(id.to_string(), secret.to_vec());
        }
        Self {
            keys: RwLock::new(keys),
            active: RwLock::new(active),
        }
    }

    /// Seed a single-key manager with a random secret.
    #[must_use]
    pub fn random() -> Self {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::seeded([("k0", secret.as_slice())])
    }

    /// Select the active signing key.
    pub fn set_active(&self, key_id: &str) -> FrameResult<()> {
        let keys = self.keys.read().map_err(|_| FrameError::lock_poisoned())?;
        if !keys.contains_key(key_id) {
            return Err(FrameError::UnknownKey(key_id.to_string()));
        }
        drop(keys);
        *self.active.write().map_err(|_| FrameError::lock_poisoned())? = key_id.to_string();
        Ok(())
    }

    /// Replace the secret for `key_id`.
    pub fn rotate(&self, key_id: &str, secret: &[u8]) -> FrameResult<()> {
        let mut keys = self.keys.write().map_err(|_| FrameError::lock_poisoned())?;
        if !keys.contains_key(key_id) {
            return Err(FrameError::UnknownKey(key_id.to_string()));
        }
        keys.insert(key_id.to_string(), secret.to_vec());
        Ok(())
    }

    /// Sign a frame with the active key. The frame's existing `sig` field
    /// is not part of the signed bytes.
    pub fn sign(&self, frame: &Frame) -> FrameResult<FrameSignature> {
        let key_id = self
            .active
            .read()
            .map_err(|_| FrameError::lock_poisoned())?
            .clone();
        self.sign_with(&key_id, frame)
    }

    /// Sign a frame with a specific key.
    pub fn sign_with(&self, key_id: &str, frame: &Frame) -> FrameResult<FrameSignature> {
        let keys = self.keys.read().map_err(|_| FrameError::lock_poisoned())?;
        let secret = keys
            .get(key_id)
            .ok_or_else(|| FrameError::UnknownKey(key_id.to_string()))?;
        let bytes = canonical_bytes(frame)?;
        let mut mac =
            HmacSha256::new_from_slice(secret).map_err(|e| FrameError::Crypto(e.to_string()))?;
        mac.update(&bytes);
        Ok(FrameSignature {
            key_id: key_id.to_string(),
            mac: hex::encode(mac.finalize().into_bytes()),
        })
    }

    /// Verify a frame's signature.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::SignatureMissing`] when the frame is unsigned,
    /// [`FrameError::UnknownKey`] when the signing key is not known, and
    /// [`FrameError::SignatureMismatch`] on MAC mismatch.
    pub fn verify(&self, frame: &Frame) -> FrameResult<()> {
        let sig = frame.sig.as_ref().ok_or(FrameError::SignatureMissing)?;
        let expected = self.sign_with(&sig.key_id, frame)?;
        // Constant-time comparison via the hmac crate would require keeping
        // the Mac around; compare decoded bytes to avoid hex-case issues.
        let got = hex::decode(&sig.mac).map_err(|e| FrameError::Crypto(e.to_string()))?;
        let want = hex::decode(&expected.mac).map_err(|e| FrameError::Crypto(e.to_string()))?;
        if got != want {
            return Err(FrameError::SignatureMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Payload;
    use lattice_core::{QosTier, SessionId, StreamId};

    fn frame() -> Frame {
        Frame::new(
            SessionId::from_string("s1"),
            StreamId::from_string("r1"),
            0,
            QosTier::Bronze,
            Payload::partial("sign me", 1.0),
        )
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let keys = KeyManager::seeded([("k1", b"topsecret".as_slice())]);
        let mut f = frame();
        f.sig = Some(keys.sign(&f).unwrap());
        assert!(keys.verify(&f).is_ok());
    }

    #[test]
    fn test_tampered_frame_fails_verification() {
        let keys = KeyManager::seeded([("k1", b"topsecret".as_slice())]);
        let mut f = frame();
        f.sig = Some(keys.sign(&f).unwrap());
        f.msg_seq = 7;
        assert!(matches!(
            keys.verify(&f),
            Err(FrameError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_unsigned_frame_is_reported_missing() {
        let keys = KeyManager::seeded([("k1", b"topsecret".as_slice())]);
        assert!(matches!(
            keys.verify(&frame()),
            Err(FrameError::SignatureMissing)
        ));
    }

    #[test]
    fn test_rotation_invalidates_old_signatures() {
        let keys = KeyManager::seeded([("k1", b"old".as_slice())]);
        let mut f = frame();
        f.sig = Some(keys.sign(&f).unwrap());
        keys.rotate("k1", b"new").unwrap();
        assert!(keys.verify(&f).is_err());
        // Re-signing under the rotated secret verifies again.
        f.sig = Some(keys.sign(&f).unwrap());
        assert!(keys.verify(&f).is_ok());
    }

    #[test]
    fn test_verification_any_key_any_frame() {
        for (i, secret) in [b"a".as_slice(), b"bb", b"ccc"].iter().enumerate() {
            let keys = KeyManager::seeded([("k", *secret)]);
            let mut f = frame();
            f.msg_seq = i as u64;
            f.sig = Some(keys.sign(&f).unwrap());
            assert!(keys.verify(&f).is_ok());
        }
    }
}
