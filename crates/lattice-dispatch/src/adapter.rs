//! The adapter capability set: `Estimate`, `Stream`, `Health`.

use async_trait::async_trait;
use futures::Stream;
use lattice_core::StreamId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::error::DispatchResult;

/// Type alias for boxed chunk streams.
pub type ChunkStream = Pin<Box<dyn Stream<Item = DispatchResult<AdapterChunk>> + Send>>;

/// Cost estimate returned by an adapter before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Expected input tokens.
    pub in_tokens: u64,
    /// Expected output tokens.
    pub out_tokens: u64,
    /// Expected cost in USD-micros.
    pub usd_micros: u64,
    /// 95th percentile token bound.
    pub p95_tokens: u64,
    /// 95th percentile cost bound.
    pub p95_usd_micros: u64,
    /// Token variance.
    pub variance_tokens: f64,
    /// Cost variance.
    pub variance_usd: f64,
    /// Adapter confidence in the estimate (0..1).
    pub confidence: f64,
    /// Per-tool cost breakdown, free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_cost_breakdown_json: Option<Value>,
    /// Assumptions the estimate rests on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assumptions: Vec<String>,
}

impl CostEstimate {
    /// Total expected tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.in_tokens + self.out_tokens
    }
}

/// One streamed chunk from an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterChunk {
    /// Chunk kind (payload type string).
    #[serde(rename = "type")]
    pub kind: String,
    /// Chunk content.
    pub content_json: Value,
    /// Adapter-reported confidence so far (0..1).
    pub confidence: f64,
    /// Input tokens consumed so far.
    pub partial_in_tokens: u64,
    /// Output tokens produced so far.
    pub partial_out_tokens: u64,
    /// Spend so far in USD-micros.
    pub partial_usd_micros: u64,
    /// More chunks follow.
    pub more: bool,
}

impl AdapterChunk {
    /// The chunk text, when content carries a `text` field.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content_json.get("text").and_then(Value::as_str)
    }
}

/// Adapter health report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdapterHealth {
    /// 95th percentile latency in milliseconds.
    pub p95_ms: f64,
    /// Error rate (0..1).
    pub error_rate: f64,
}

/// The capability set every model/tool back-end exposes.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable adapter identifier.
    fn id(&self) -> &str;

    /// Estimate the cost of serving `prompt_json` for `task_type`.
    async fn estimate(
        &self,
        stream_id: &StreamId,
        task_type: &str,
        prompt_json: &Value,
    ) -> DispatchResult<CostEstimate>;

    /// Open a chunk stream for `prompt_json`.
    async fn stream(
        &self,
        stream_id: &StreamId,
        prompt_json: &Value,
    ) -> DispatchResult<ChunkStream>;

    /// Current health.
    async fn health(&self) -> DispatchResult<AdapterHealth>;
}

/// Blanket implementation so `Box<dyn Adapter>` satisfies `A: Adapter`.
#[async_trait]
impl Adapter for Box<dyn Adapter> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn estimate(
        &self,
        stream_id: &StreamId,
        task_type: &str,
        prompt_json: &Value,
    ) -> DispatchResult<CostEstimate> {
        (**self).estimate(stream_id, task_type, prompt_json).await
    }

    async fn stream(
        &self,
        stream_id: &StreamId,
        prompt_json: &Value,
    ) -> DispatchResult<ChunkStream> {
        (**self).stream(stream_id, prompt_json).await
    }

    async fn health(&self) -> DispatchResult<AdapterHealth> {
        (**self).health().await
    }
}
