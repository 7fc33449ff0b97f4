//! Optional session attribute table.
//!
//! A small KV of `session_id → (attrs_json, updated_at)` purged by TTL.
//! Deployments that need session attributes to survive the process put an
//! external store behind the trait; the default is in-memory.

use dashmap::DashMap;
use lattice_core::SessionId;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::error::SessionResult;

/// Session attribute storage contract.
pub trait SessionTable: Send + Sync {
    /// Upsert a session's attributes.
    fn put(&self, session_id: &SessionId, attrs: Value) -> SessionResult<()>;

    /// Fetch a session's attributes.
    fn get(&self, session_id: &SessionId) -> SessionResult<Option<Value>>;

    /// Remove a session.
    fn remove(&self, session_id: &SessionId) -> SessionResult<()>;

    /// Drop entries untouched for longer than the TTL; returns the count.
    fn purge(&self, now: Instant) -> SessionResult<usize>;
}

/// In-memory session table.
pub struct InMemorySessionTable {
    entries: DashMap<SessionId, (Value, Instant)>,
    ttl: Duration,
}

impl InMemorySessionTable {
    /// Create a table with the given entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }
}

impl SessionTable for InMemorySessionTable {
    fn put(&self, session_id: &SessionId, attrs: Value) -> SessionResult<()> {
        self.entries
            .insert(session_id.clone(), (attrs, Instant::now()));
        Ok(())
    }

    fn get(&self, session_id: &SessionId) -> SessionResult<Option<Value>> {
        Ok(self.entries.get(session_id).map(|e| e.value().0.clone()))
    }

    fn remove(&self, session_id: &SessionId) -> SessionResult<()> {
        self.entries.remove(session_id);
        Ok(())
    }

    fn purge(&self, now: Instant) -> SessionResult<usize> {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, touched)| now.duration_since(*touched) < ttl);
        Ok(before - self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let table = InMemorySessionTable::new(Duration::from_secs(60));
        let id = SessionId::from_string("s1");
        table
            .put(&id, serde_json::json!({ "tenant": "acme" }))
            .unwrap();
        assert_eq!(
            table.get(&id).unwrap().unwrap()["tenant"],
            serde_json::json!("acme")
        );
        table.remove(&id).unwrap();
        assert!(table.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_ttl_purge() {
        let table = InMemorySessionTable::new(Duration::from_millis(0));
        let id = SessionId::from_string("s1");
        table.put(&id, serde_json::json!({})).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(table.purge(Instant::now()).unwrap(), 1);
        assert!(table.get(&id).unwrap().is_none());
    }
}
