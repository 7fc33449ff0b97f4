//! Scripted adapters for tests.
//!
//! `ScriptedAdapter` plays back a fixed chunk script with configurable
//! confidence and cost, letting routing and escalation logic be exercised
//! without a live model process.

use async_trait::async_trait;
use futures::stream;
use lattice_core::StreamId;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::adapter::{Adapter, AdapterChunk, AdapterHealth, ChunkStream, CostEstimate};
use crate::error::{DispatchError, DispatchResult};

/// A deterministic adapter playing back a scripted stream.
pub struct ScriptedAdapter {
    id: String,
    chunks: Vec<AdapterChunk>,
    estimate: CostEstimate,
    health: AdapterHealth,
    fail_transport: bool,
    calls: Arc<AtomicU64>,
}

impl ScriptedAdapter {
    /// A healthy adapter streaming two partials and a final.
    #[must_use]
    pub fn healthy(id: &str) -> Self {
        Self::with_script(
            id,
            vec![
                chunk("agent.result.partial", "The answer ", 0.9, 40, 10, 120, true),
                chunk("agent.result.partial", "is simple: ", 0.92, 40, 20, 240, true),
                chunk("agent.result.final", "retrieval plus generation.", 0.95, 40, 32, 400, false),
            ],
        )
    }

    /// An adapter whose chunks report low confidence (escalation trigger).
    #[must_use]
    pub fn low_confidence(id: &str) -> Self {
        Self::with_script(
            id,
            vec![
                chunk("agent.result.partial", "Maybe ", 0.3, 40, 20, 100, true),
                chunk("agent.result.partial", "possibly ", 0.3, 40, 45, 200, true),
                chunk("agent.result.final", "unsure.", 0.3, 40, 60, 300, false),
            ],
        )
    }

    /// An adapter that always fails at the transport level.
    #[must_use]
    pub fn failing(id: &str) -> Self {
        let mut adapter = Self::with_script(id, Vec::new());
        adapter.fail_transport = true;
        adapter
    }

    /// An adapter playing back an explicit script.
    #[must_use]
    pub fn with_script(id: &str, chunks: Vec<AdapterChunk>) -> Self {
        let out_tokens = chunks.last().map_or(16, |c| c.partial_out_tokens);
        let usd_micros = chunks.last().map_or(200, |c| c.partial_usd_micros);
        Self {
            id: id.to_string(),
            chunks,
            estimate: CostEstimate {
                in_tokens: 40,
                out_tokens,
                usd_micros,
                p95_tokens: out_tokens * 2,
                p95_usd_micros: usd_micros * 2,
                variance_tokens: 4.0,
                variance_usd: 0.5,
                confidence: 0.8,
                tool_cost_breakdown_json: None,
                assumptions: vec!["scripted".to_string()],
            },
            health: AdapterHealth {
                p95_ms: 120.0,
                error_rate: 0.01,
            },
            fail_transport: false,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Override the cost estimate.
    #[must_use]
    pub fn with_estimate(mut self, estimate: CostEstimate) -> Self {
        self.estimate = estimate;
        self
    }

    /// Number of `stream` calls made against this adapter.
    #[must_use]
    pub fn stream_calls(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }
}

/// Build a chunk for a script.
#[must_use]
pub fn chunk(
    kind: &str,
    text: &str,
    confidence: f64,
    in_tokens: u64,
    out_tokens: u64,
    usd_micros: u64,
    more: bool,
) -> AdapterChunk {
    AdapterChunk {
        kind: kind.to_string(),
        content_json: serde_json::json!({ "text": text }),
        confidence,
        partial_in_tokens: in_tokens,
        partial_out_tokens: out_tokens,
        partial_usd_micros: usd_micros,
        more,
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn estimate(
        &self,
        _stream_id: &StreamId,
        _task_type: &str,
        _prompt_json: &Value,
    ) -> DispatchResult<CostEstimate> {
        if self.fail_transport {
            return Err(DispatchError::Transport("scripted outage".to_string()));
        }
        Ok(self.estimate.clone())
    }

    async fn stream(
        &self,
        _stream_id: &StreamId,
        _prompt_json: &Value,
    ) -> DispatchResult<ChunkStream> {
        if self.fail_transport {
            return Err(DispatchError::Transport("scripted outage".to_string()));
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        let chunks: Vec<DispatchResult<AdapterChunk>> =
            self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn health(&self) -> DispatchResult<AdapterHealth> {
        Ok(self.health)
    }
}
