//! Lattice Telemetry - Metrics, spans, and logging for the control plane.
//!
//! This crate provides:
//! - A process-local registry of counters, gauges, and histograms
//! - A cardinality guardrail that samples label values per metric
//! - A small span abstraction with per-QoS sampling ratios
//! - Configurable logging setup over the tracing ecosystem

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod cardinality;
mod error;
mod logging;
pub mod metrics;
pub mod span;

pub use cardinality::{CardinalityGuard, CardinalityReport, CardinalitySeverity};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{setup_logging, LogConfig, LogFormat};
pub use metrics::{Counter, Gauge, Histogram, MetricsRegistry, MetricsSnapshot};
pub use span::{Span, SpanSampler};
