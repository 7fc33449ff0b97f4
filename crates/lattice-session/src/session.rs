//! Session records and the sharded session map.
//!
//! Sessions are created on the first admitted frame and destroyed by FIN
//! plus drain, idle timeout, or RST. A session is exclusively owned by one
//! router instance while active. Streams are owned by their session
//! (arena-and-index: no back-pointers; schedulers hold IDs only).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lattice_admission::TripletBudget;
use lattice_core::{QosTier, SessionId, StreamId};
use lattice_frame::{Frame, TripletWindow};
use lattice_telemetry::MetricsRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{SessionError, SessionResult};
use crate::heartbeat::HeartbeatScheduler;
use crate::store::ReassemblyStore;
use crate::stream::{FragmentEvent, StreamMachine, StreamPhase};

/// Read-consistency class for session-scoped state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyClass {
    /// Reads may go to any replica.
    #[default]
    Eventual,
    /// Reads go to the primary for a window after each write.
    ReadYourWrites,
}

/// One live session.
pub struct SessionRecord {
    /// Session identifier.
    pub id: SessionId,
    /// QoS tier of the session.
    pub qos: QosTier,
    /// Router-advertised window.
    pub router_window: TripletWindow,
    /// Agent-suggested window (effective = min of both).
    pub agent_window: Option<TripletWindow>,
    /// Triplet budget charged by admission.
    pub budget: Arc<TripletBudget>,
    /// Read-consistency class.
    pub consistency: ConsistencyClass,
    /// Last write timestamp, gating reads under read-your-writes.
    pub last_write: Option<DateTime<Utc>>,
    /// Live streams.
    pub streams: HashMap<StreamId, StreamMachine>,
    /// Per-stream heartbeat schedulers.
    pub heartbeats: HashMap<StreamId, HeartbeatScheduler>,
    /// Session creation time.
    pub created_at: Instant,
    /// Last frame activity.
    pub last_activity: Instant,
    /// Set when the session was selected for preemption.
    pub draining: bool,
}

impl SessionRecord {
    /// Effective window: min(router advertised, agent suggested), with the
    /// parallel dimension clamped to one while draining.
    #[must_use]
    pub fn effective_window(&self) -> TripletWindow {
        let base = match self.agent_window {
            Some(agent) => self.router_window.min(agent),
            None => self.router_window,
        };
        if self.draining {
            base.clamp_parallel(1)
        } else {
            base
        }
    }

    /// Whether reads must go to the primary right now.
    #[must_use]
    pub fn reads_from_primary(&self, ryw_window: Duration, now: DateTime<Utc>) -> bool {
        match self.consistency {
            ConsistencyClass::Eventual => false,
            ConsistencyClass::ReadYourWrites => self.last_write.is_some_and(|w| {
                now.signed_duration_since(w).to_std().map_or(true, |d| d < ryw_window)
            }),
        }
    }

    /// Record a write for read-your-writes gating.
    pub fn note_write(&mut self, now: DateTime<Utc>) {
        self.last_write = Some(now);
    }
}

/// Sharded map of live sessions.
///
/// Shard locking is internal to [`DashMap`]; callers never hold two shard
/// locks at once because every operation touches a single session.
pub struct SessionMap {
    sessions: DashMap<SessionId, Arc<Mutex<SessionRecord>>>,
    metrics: Arc<MetricsRegistry>,
    gap_ttl: Duration,
    hb_interval_s: u64,
    hb_idle_fin_s: u64,
    /// Mirrors fragments so reassembly survives process boundaries.
    external_store: Option<Arc<dyn ReassemblyStore>>,
}

impl SessionMap {
    /// Create an empty map.
    #[must_use]
    pub fn new(
        metrics: Arc<MetricsRegistry>,
        gap_ttl: Duration,
        hb_interval_s: u64,
        hb_idle_fin_s: u64,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            metrics,
            gap_ttl,
            hb_interval_s,
            hb_idle_fin_s,
            external_store: None,
        }
    }

    /// Mirror fragment persistence into an external reassembly store.
    #[must_use]
    pub fn with_external_store(mut self, store: Arc<dyn ReassemblyStore>) -> Self {
        self.external_store = Some(store);
        self
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Fetch a session handle.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<Mutex<SessionRecord>>> {
        self.sessions.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Create a session on its first admitted frame.
    pub fn create(
        &self,
        id: SessionId,
        qos: QosTier,
        router_window: TripletWindow,
        budget: Arc<TripletBudget>,
    ) -> Arc<Mutex<SessionRecord>> {
        let record = Arc::new(Mutex::new(SessionRecord {
            id: id.clone(),
            qos,
            router_window,
            agent_window: None,
            budget,
            consistency: ConsistencyClass::default(),
            last_write: None,
            streams: HashMap::new(),
            heartbeats: HashMap::new(),
            created_at: Instant::now(),
            last_activity: Instant::now(),
            draining: false,
        }));
        self.sessions.insert(id.clone(), Arc::clone(&record));
        self.metrics.gauge("sessions_live").set(self.sessions.len() as f64);
        info!(session = %id, qos = %qos, "session created");
        record
    }

    /// Route one inbound data frame to its stream, creating the stream on
    /// SYN. Returns the fragment event from the stream machine.
    pub fn handle_frame(&self, frame: &Frame) -> SessionResult<FragmentEvent> {
        let record = self
            .get(&frame.session_id)
            .ok_or_else(|| SessionError::UnknownSession(frame.session_id.clone()))?;
        let mut session = record.lock().map_err(|_| SessionError::poisoned())?;
        session.last_activity = Instant::now();

        if let Some(agent_window) = frame.window {
            session.agent_window = Some(agent_window);
        }

        if !session.streams.contains_key(&frame.stream_id) {
            if !frame.flags.syn {
                return Err(SessionError::UnknownStream(frame.stream_id.clone()));
            }
            let window = session.effective_window();
            let mut machine = StreamMachine::new(window, self.gap_ttl);
            machine.admit()?;
            machine.start_streaming()?;
            session.streams.insert(frame.stream_id.clone(), machine);
            session.heartbeats.insert(
                frame.stream_id.clone(),
                HeartbeatScheduler::new(self.hb_interval_s, self.hb_idle_fin_s, Instant::now()),
            );
            debug!(session = %frame.session_id, stream = %frame.stream_id, "stream opened");
        }

        if let Some(hb) = session.heartbeats.get_mut(&frame.stream_id) {
            hb.touch(Instant::now());
        }

        if frame.flags.rst {
            if let Some(machine) = session.streams.get_mut(&frame.stream_id) {
                machine.fail();
            }
            return Ok(FragmentEvent::default());
        }

        let machine = session
            .streams
            .get_mut(&frame.stream_id)
            .ok_or_else(|| SessionError::UnknownStream(frame.stream_id.clone()))?;

        let event = machine.handle_fragment(frame)?;
        self.metrics.counter("acks_tx").inc_by(u64::from(event.ack_steps));
        self.metrics
            .counter("retransmit_requests")
            .inc_by(event.nacks.len() as u64);

        if let Some(store) = &self.external_store {
            let chunk = frame
                .payload
                .body
                .get("chunk")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| frame.payload.body.to_string());
            if let Err(e) = store.push_part(
                &frame.session_id,
                &frame.stream_id,
                frame.msg_seq,
                frame.frag_seq,
                &chunk,
                frame.is_last_fragment(),
            ) {
                debug!(error = %e, "external reassembly mirror failed");
            }
            if event.completed.is_some() {
                let key = (frame.session_id.clone(), frame.stream_id.clone(), frame.msg_seq);
                let _ = store.clear(&key);
            }
        }

        if frame.flags.fin {
            if machine.phase() == StreamPhase::Paused {
                machine.resume()?;
            }
            machine.finalize()?;
            debug!(session = %frame.session_id, stream = %frame.stream_id, "stream finalized by FIN");
        }
        Ok(event)
    }

    /// Mark a session draining (preemption victim).
    pub fn mark_draining(&self, id: &SessionId) -> SessionResult<()> {
        let record = self
            .get(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        let mut session = record.lock().map_err(|_| SessionError::poisoned())?;
        session.draining = true;
        Ok(())
    }

    /// Remove a session whose streams have all reached a terminal phase,
    /// or unconditionally on RST/idle teardown.
    pub fn destroy(&self, id: &SessionId) {
        if self.sessions.remove(id).is_some() {
            self.metrics.gauge("sessions_live").set(self.sessions.len() as f64);
            info!(session = %id, "session destroyed");
        }
    }

    /// Sweep idle sessions: any session whose `last_activity` is older than
    /// `idle_timeout` is destroyed. Returns the destroyed IDs.
    pub fn sweep_idle(&self, idle_timeout: Duration, now: Instant) -> Vec<SessionId> {
        let mut victims = Vec::new();
        for entry in &self.sessions {
            if let Ok(session) = entry.value().lock() {
                if now.duration_since(session.last_activity) >= idle_timeout {
                    victims.push(session.id.clone());
                }
            }
        }
        for id in &victims {
            self.destroy(id);
        }
        victims
    }

    /// All live sessions as preemption candidates.
    #[must_use]
    pub fn preemption_candidates(&self) -> Vec<lattice_admission::PreemptionCandidate> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                entry.value().lock().ok().map(|s| lattice_admission::PreemptionCandidate {
                    session_id: s.id.clone(),
                    qos: s.qos,
                    started_at: s.created_at,
                })
            })
            .collect()
    }
}
