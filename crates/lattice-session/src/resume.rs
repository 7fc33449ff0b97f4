//! Single-use, TTL-bounded resumption tokens.

use dashmap::DashMap;
use lattice_core::{SessionId, StreamId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

struct TokenEntry {
    session_id: SessionId,
    stream_id: StreamId,
    expires_at: Instant,
}

/// Issues and redeems resumption tokens.
///
/// A token is an opaque hex string bound to one `(session, stream)` pair.
/// Redemption succeeds at most once and only before expiry.
pub struct ResumeTokenStore {
    tokens: DashMap<String, TokenEntry>,
    ttl: Duration,
    resumes_total: AtomicU64,
}

impl ResumeTokenStore {
    /// Create a store with the given token TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl,
            resumes_total: AtomicU64::new(0),
        }
    }

    /// Issue a token for a stream.
    pub fn issue(&self, session_id: &SessionId, stream_id: &StreamId) -> String {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.tokens.insert(
            token.clone(),
            TokenEntry {
                session_id: session_id.clone(),
                stream_id: stream_id.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Redeem a token for the given stream. Returns `true` at most once
    /// per token; the token is invalidated regardless of binding match so
    /// a guessed replay cannot probe bindings.
    pub fn resume(&self, token: &str, session_id: &SessionId, stream_id: &StreamId) -> bool {
        let Some((_, entry)) = self.tokens.remove(token) else {
            return false;
        };
        if Instant::now() > entry.expires_at {
            debug!("resume token expired");
            return false;
        }
        let matches = entry.session_id == *session_id && entry.stream_id == *stream_id;
        if matches {
            self.resumes_total.fetch_add(1, Ordering::Relaxed);
        }
        matches
    }

    /// Successful resumes (`resumes_total`).
    #[must_use]
    pub fn resumes_total(&self) -> u64 {
        self.resumes_total.load(Ordering::Relaxed)
    }

    /// Drop expired tokens.
    pub fn prune(&self, now: Instant) {
        self.tokens.retain(|_, entry| entry.expires_at >= now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (SessionId, StreamId) {
        (SessionId::from_string("s"), StreamId::from_string("r"))
    }

    #[test]
    fn test_resume_succeeds_at_most_once() {
        let store = ResumeTokenStore::new(Duration::from_secs(60));
        let (session, stream) = ids();
        let token = store.issue(&session, &stream);
        assert!(store.resume(&token, &session, &stream));
        assert!(!store.resume(&token, &session, &stream));
        assert_eq!(store.resumes_total(), 1);
    }

    #[test]
    fn test_wrong_binding_rejected_and_burned() {
        let store = ResumeTokenStore::new(Duration::from_secs(60));
        let (session, stream) = ids();
        let token = store.issue(&session, &stream);
        let other = SessionId::from_string("other");
        assert!(!store.resume(&token, &other, &stream));
        // Burned by the failed attempt.
        assert!(!store.resume(&token, &session, &stream));
        assert_eq!(store.resumes_total(), 0);
    }

    #[test]
    fn test_expired_token_rejected() {
        let store = ResumeTokenStore::new(Duration::from_millis(0));
        let (session, stream) = ids();
        let token = store.issue(&session, &stream);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!store.resume(&token, &session, &stream));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let store = ResumeTokenStore::new(Duration::from_secs(60));
        let (session, stream) = ids();
        assert!(!store.resume("deadbeef", &session, &stream));
    }
}
