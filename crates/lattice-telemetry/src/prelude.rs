//! Prelude module - commonly used types for convenient import.

pub use crate::cardinality::{CardinalityGuard, CardinalityReport, CardinalitySeverity};
pub use crate::error::{TelemetryError, TelemetryResult};
pub use crate::logging::{setup_logging, LogConfig, LogFormat};
pub use crate::metrics::{Counter, Gauge, Histogram, MetricsRegistry, MetricsSnapshot};
pub use crate::span::{Span, SpanSampler};
