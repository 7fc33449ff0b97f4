//! Adapter pool: registration, circuit-breaker guarding, transport retry.

use dashmap::DashMap;
use lattice_config::CircuitSection;
use lattice_core::{AdapterId, StreamId};
use lattice_telemetry::MetricsRegistry;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

use crate::adapter::{Adapter, AdapterHealth, ChunkStream, CostEstimate};
use crate::circuit::{CircuitBreaker, CircuitState};
use crate::error::{DispatchError, DispatchResult};

/// Pool of registered adapters keyed by adapter id.
pub struct AdapterPool {
    adapters: DashMap<AdapterId, Arc<dyn Adapter>>,
    breakers: DashMap<AdapterId, Mutex<CircuitBreaker>>,
    circuit_config: CircuitSection,
    metrics: Arc<MetricsRegistry>,
    /// Transport-level retries per call (semantic failures never retry).
    transport_retries: u32,
}

impl AdapterPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new(circuit_config: CircuitSection, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            adapters: DashMap::new(),
            breakers: DashMap::new(),
            circuit_config,
            metrics,
            transport_retries: 1,
        }
    }

    /// Register an adapter. Compliance with the capability set is enforced
    /// by the trait itself; registration only rejects duplicate or empty
    /// identifiers.
    pub fn register(&self, adapter: Arc<dyn Adapter>) -> DispatchResult<AdapterId> {
        let id = AdapterId::new(adapter.id());
        if id.as_str().is_empty() {
            return Err(DispatchError::Registration("empty adapter id".to_string()));
        }
        if self.adapters.contains_key(&id) {
            return Err(DispatchError::Registration(format!(
                "duplicate adapter id: {id}"
            )));
        }
        self.breakers
            .insert(id.clone(), Mutex::new(CircuitBreaker::new(&self.circuit_config)));
        self.adapters.insert(id.clone(), adapter);
        debug!(adapter = %id, "adapter registered");
        Ok(id)
    }

    /// Registered adapter ids.
    #[must_use]
    pub fn adapter_ids(&self) -> Vec<AdapterId> {
        self.adapters.iter().map(|e| e.key().clone()).collect()
    }

    /// Whether the adapter's circuit currently fails fast.
    #[must_use]
    pub fn is_open(&self, id: &AdapterId) -> bool {
        self.with_breaker(id, |b| b.state(Instant::now()) == CircuitState::Open)
            .unwrap_or(false)
    }

    /// Call `Estimate` through the breaker, with transport retry.
    pub async fn estimate(
        &self,
        id: &AdapterId,
        stream_id: &StreamId,
        task_type: &str,
        prompt_json: &Value,
    ) -> DispatchResult<CostEstimate> {
        let adapter = self.checked_out(id)?;
        let mut attempt = 0;
        loop {
            let result = adapter.estimate(stream_id, task_type, prompt_json).await;
            match &result {
                Ok(_) => self.feedback(id, true),
                Err(e) if e.is_transport() && attempt < self.transport_retries => {
                    attempt += 1;
                    warn!(adapter = %id, attempt, "transport failure, retrying estimate");
                    continue;
                },
                Err(_) => self.feedback(id, false),
            }
            return result;
        }
    }

    /// Call `Stream` through the breaker.
    ///
    /// Breaker feedback is applied to the call that opens the stream; chunk
    /// errors surface to the router, which reports back via
    /// [`feedback`](Self::feedback) when the stream ends.
    pub async fn open_stream(
        &self,
        id: &AdapterId,
        stream_id: &StreamId,
        prompt_json: &Value,
    ) -> DispatchResult<ChunkStream> {
        let adapter = self.checked_out(id)?;
        let mut attempt = 0;
        loop {
            let result = adapter.stream(stream_id, prompt_json).await;
            match &result {
                Ok(_) => self.feedback(id, true),
                Err(e) if e.is_transport() && attempt < self.transport_retries => {
                    attempt += 1;
                    warn!(adapter = %id, attempt, "transport failure, retrying stream open");
                    continue;
                },
                Err(_) => self.feedback(id, false),
            }
            return result;
        }
    }

    /// Call `Health` (not breaker-guarded; health probes must reach
    /// degraded adapters).
    pub async fn health(&self, id: &AdapterId) -> DispatchResult<AdapterHealth> {
        let adapter = self
            .adapters
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| DispatchError::UnknownAdapter(id.clone()))?;
        adapter.health().await
    }

    /// Report a call outcome to the adapter's breaker.
    pub fn feedback(&self, id: &AdapterId, ok: bool) {
        let now = Instant::now();
        self.with_breaker(id, |b| {
            if ok {
                b.on_success();
            } else {
                b.on_failure(now);
            }
        });
        self.update_open_gauge();
    }

    fn checked_out(&self, id: &AdapterId) -> DispatchResult<Arc<dyn Adapter>> {
        let adapter = self
            .adapters
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| DispatchError::UnknownAdapter(id.clone()))?;
        let allowed = self
            .with_breaker(id, |b| b.allow(Instant::now()))
            .unwrap_or(true);
        self.update_open_gauge();
        if !allowed {
            return Err(DispatchError::CircuitOpen(id.clone()));
        }
        Ok(adapter)
    }

    fn with_breaker<T>(&self, id: &AdapterId, f: impl FnOnce(&mut CircuitBreaker) -> T) -> Option<T> {
        self.breakers
            .get(id)
            .and_then(|entry| entry.value().lock().ok().map(|mut b| f(&mut b)))
    }

    fn update_open_gauge(&self) {
        let now = Instant::now();
        let open = self
            .breakers
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .lock()
                    .map(|mut b| b.state(now) == CircuitState::Open)
                    .unwrap_or(false)
            })
            .count();
        self.metrics.gauge("circuits_open").set(open as f64);
    }
}
