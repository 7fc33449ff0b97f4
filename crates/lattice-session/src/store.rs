//! External reassembly store contract.
//!
//! When configured, fragment persistence and completion delegate to an
//! external store so reassembly survives process boundaries. The default
//! implementation is in-memory.

use dashmap::DashMap;
use lattice_core::{SessionId, StreamId};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::SessionResult;

/// Key of one in-flight message.
pub type MessageKey = (SessionId, StreamId, u64);

/// Pluggable fragment store.
///
/// `push_part` returns `(complete, full_text)`: `complete` is true when the
/// message now has contiguous fragments `0..=last` with the terminal seen,
/// and `full_text` is the concatenation in `frag_seq` order.
pub trait ReassemblyStore: Send + Sync {
    /// Persist one fragment; report completion.
    fn push_part(
        &self,
        session_id: &SessionId,
        stream_id: &StreamId,
        msg_seq: u64,
        frag_seq: u32,
        text: &str,
        is_last: bool,
    ) -> SessionResult<(bool, Option<String>)>;

    /// Discard all state for a message.
    fn clear(&self, key: &MessageKey) -> SessionResult<()>;

    /// Drop messages idle longer than their TTL.
    fn prune(&self, now: Instant) -> SessionResult<usize>;
}

struct PendingMessage {
    parts: BTreeMap<u32, String>,
    expected_last: Option<u32>,
    last_arrival: Instant,
}

/// In-memory reassembly store.
pub struct InMemoryReassemblyStore {
    messages: DashMap<MessageKey, PendingMessage>,
    ttl: Duration,
}

impl InMemoryReassemblyStore {
    /// Create a store with the given idle TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            messages: DashMap::new(),
            ttl,
        }
    }
}

impl ReassemblyStore for InMemoryReassemblyStore {
    fn push_part(
        &self,
        session_id: &SessionId,
        stream_id: &StreamId,
        msg_seq: u64,
        frag_seq: u32,
        text: &str,
        is_last: bool,
    ) -> SessionResult<(bool, Option<String>)> {
        let key = (session_id.clone(), stream_id.clone(), msg_seq);
        let mut entry = self.messages.entry(key.clone()).or_insert_with(|| {
            PendingMessage {
                parts: BTreeMap::new(),
                expected_last: None,
                last_arrival: Instant::now(),
            }
        });
        entry.last_arrival = Instant::now();
        entry.parts.entry(frag_seq).or_insert_with(|| text.to_string());
        if is_last {
            entry.expected_last = Some(frag_seq);
        }

        let complete = entry.expected_last.is_some_and(|last| {
            (0..=last).all(|seq| entry.parts.contains_key(&seq))
        });
        if !complete {
            return Ok((false, None));
        }
        let full: String = entry.parts.values().cloned().collect();
        drop(entry);
        self.messages.remove(&key);
        Ok((true, Some(full)))
    }

    fn clear(&self, key: &MessageKey) -> SessionResult<()> {
        self.messages.remove(key);
        Ok(())
    }

    fn prune(&self, now: Instant) -> SessionResult<usize> {
        let before = self.messages.len();
        let ttl = self.ttl;
        self.messages
            .retain(|_, m| now.duration_since(m.last_arrival) < ttl);
        Ok(before - self.messages.len())
    }
}
