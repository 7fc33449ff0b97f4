//! Span abstraction with per-QoS sampling.
//!
//! Spans here are lightweight timing records emitted as structured tracing
//! events on completion. Whether a span is recorded at all is decided by
//! the sampler from the request's QoS tier: gold traffic is fully sampled,
//! bronze mostly dropped.

use lattice_core::QosTier;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use tracing::info;

/// Per-QoS sampling ratios.
#[derive(Debug, Clone, Copy)]
pub struct SpanSampler {
    /// Sampling ratio for gold traffic.
    pub gold: f64,
    /// Sampling ratio for silver traffic.
    pub silver: f64,
    /// Sampling ratio for bronze traffic.
    pub bronze: f64,
}

impl SpanSampler {
    /// Sampling decision for a unit of traffic.
    ///
    /// Deterministic in `key` so that all spans of one session share a
    /// fate and a resumed trace stays coherent.
    #[must_use]
    pub fn sample(&self, qos: QosTier, key: &str) -> bool {
        let ratio = match qos {
            QosTier::Gold => self.gold,
            QosTier::Silver => self.silver,
            QosTier::Bronze => self.bronze,
        };
        if ratio >= 1.0 {
            return true;
        }
        if ratio <= 0.0 {
            return false;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let draw = (hasher.finish() % 10_000) as f64 / 10_000.0;
        draw < ratio
    }

    /// Start a span if the sampler admits it.
    #[must_use]
    pub fn start(&self, name: &'static str, qos: QosTier, key: &str) -> Option<Span> {
        self.sample(qos, key).then(|| Span::start(name))
    }
}

impl Default for SpanSampler {
    fn default() -> Self {
        Self {
            gold: 1.0,
            silver: 0.5,
            bronze: 0.1,
        }
    }
}

/// A timed span, emitted as a structured event when finished.
#[derive(Debug)]
pub struct Span {
    name: &'static str,
    started: Instant,
    attrs: Vec<(&'static str, String)>,
    finished: bool,
}

impl Span {
    /// Start a span unconditionally.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
            attrs: Vec::new(),
            finished: false,
        }
    }

    /// Attach an attribute.
    pub fn record(&mut self, key: &'static str, value: impl ToString) {
        self.attrs.push((key, value.to_string()));
    }

    /// Finish and emit the span.
    pub fn finish(mut self) {
        self.emit();
        self.finished = true;
    }

    fn emit(&self) {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let attrs: Vec<String> = self
            .attrs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        info!(
            span = self.name,
            duration_ms,
            attrs = %attrs.join(","),
            "span"
        );
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.finished {
            self.emit();
        }
    }
}
