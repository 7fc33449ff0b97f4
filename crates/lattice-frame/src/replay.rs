//! TTL-bounded nonce store for replay rejection.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Rejects duplicate frames within a replay window.
///
/// Keys are sharded by hash internally ([`DashMap`]); entries expire after
/// the configured TTL and are swept opportunistically on insert.
pub struct NonceStore {
    seen: DashMap<String, Instant>,
    ttl: Duration,
    sweep_every: u64,
    inserts: std::sync::atomic::AtomicU64,
}

impl NonceStore {
    /// Create a store with the given replay window.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
            sweep_every: 1024,
            inserts: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Record a nonce; returns `false` if it was already seen within the
    /// window (the frame must be rejected).
    pub fn check_and_insert(&self, key: &str) -> bool {
        self.maybe_sweep();
        let now = Instant::now();
        let mut fresh = true;
        self.seen
            .entry(key.to_string())
            .and_modify(|seen_at| {
                if now.duration_since(*seen_at) < self.ttl {
                    fresh = false;
                } else {
                    // Expired entry: treat as new and refresh.
                    *seen_at = now;
                }
            })
            .or_insert(now);
        if !fresh {
            trace!(key, "replayed nonce rejected");
        }
        fresh
    }

    /// Number of live (possibly expired, unswept) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn maybe_sweep(&self) {
        use std::sync::atomic::Ordering;
        let n = self.inserts.fetch_add(1, Ordering::Relaxed);
        if n % self.sweep_every != 0 {
            return;
        }
        let now = Instant::now();
        let ttl = self.ttl;
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_within_window_rejected() {
        let store = NonceStore::new(Duration::from_secs(60));
        assert!(store.check_and_insert("n1"));
        assert!(!store.check_and_insert("n1"));
        assert!(store.check_and_insert("n2"));
    }

    #[test]
    fn test_expired_nonce_accepted_again() {
        let store = NonceStore::new(Duration::from_millis(0));
        assert!(store.check_and_insert("n1"));
        // TTL of zero: the previous sighting is immediately stale.
        assert!(store.check_and_insert("n1"));
    }
}
