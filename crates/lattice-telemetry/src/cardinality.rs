//! Cardinality guardrail.
//!
//! Samples distinct label values per `(metric, label key)` pair. When a
//! pair's distinct-value count crosses the warning or critical threshold a
//! structured recommendation is produced and `cardinality_alerts_total`
//! grows. The sample is capped so the guard itself stays bounded.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Severity of a cardinality finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardinalitySeverity {
    /// Above the warning threshold.
    Warning,
    /// Above the critical threshold.
    Critical,
}

/// A structured recommendation for an over-cardinal label.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CardinalityReport {
    /// Metric name.
    pub metric: String,
    /// Offending label key.
    pub label: String,
    /// Distinct values sampled so far.
    pub distinct_values: usize,
    /// Severity reached.
    pub severity: CardinalitySeverity,
    /// Suggested remediation.
    pub recommendation: String,
}

#[derive(Default)]
struct LabelSample {
    values: HashSet<String>,
    warned: bool,
    criticaled: bool,
}

/// Samples label values and raises recommendations past thresholds.
pub struct CardinalityGuard {
    samples: DashMap<(String, String), LabelSample>,
    warning_threshold: usize,
    critical_threshold: usize,
    sample_cap: usize,
    alerts_total: AtomicU64,
    reports: Mutex<Vec<CardinalityReport>>,
}

impl CardinalityGuard {
    /// Create a guard with explicit thresholds.
    #[must_use]
    pub fn new(warning_threshold: usize, critical_threshold: usize) -> Self {
        Self {
            samples: DashMap::new(),
            warning_threshold,
            critical_threshold,
            sample_cap: critical_threshold.saturating_mul(2).max(1024),
            alerts_total: AtomicU64::new(0),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Record the label values of one observation.
    pub fn observe(&self, metric: &str, labels: &[(&str, &str)]) {
        for (key, value) in labels {
            let mut entry = self
                .samples
                .entry((metric.to_string(), (*key).to_string()))
                .or_default();
            if entry.values.len() < self.sample_cap {
                entry.values.insert((*value).to_string());
            }
            let distinct = entry.values.len();
            if distinct > self.critical_threshold && !entry.criticaled {
                entry.criticaled = true;
                self.raise(metric, key, distinct, CardinalitySeverity::Critical);
            } else if distinct > self.warning_threshold && !entry.warned {
                entry.warned = true;
                self.raise(metric, key, distinct, CardinalitySeverity::Warning);
            }
        }
    }

    fn raise(&self, metric: &str, label: &str, distinct: usize, severity: CardinalitySeverity) {
        self.alerts_total.fetch_add(1, Ordering::Relaxed);
        let recommendation = match severity {
            CardinalitySeverity::Warning => format!(
                "label '{label}' on '{metric}' is growing; consider bucketing or hashing values"
            ),
            CardinalitySeverity::Critical => format!(
                "label '{label}' on '{metric}' is unbounded; drop the label or replace values \
                 with a bounded enumeration"
            ),
        };
        warn!(metric, label, distinct, ?severity, "cardinality alert");
        let report = CardinalityReport {
            metric: metric.to_string(),
            label: label.to_string(),
            distinct_values: distinct,
            severity,
            recommendation,
        };
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }

    /// Total alerts raised (`cardinality_alerts_total`).
    #[must_use]
    pub fn alerts_total(&self) -> u64 {
        self.alerts_total.load(Ordering::Relaxed)
    }

    /// Drain accumulated recommendations.
    #[must_use]
    pub fn take_reports(&self) -> Vec<CardinalityReport> {
        self.reports.lock().map(|mut r| std::mem::take(&mut *r)).unwrap_or_default()
    }
}

impl Default for CardinalityGuard {
    fn default() -> Self {
        Self::new(100, 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_raised_once_past_threshold() {
        let guard = CardinalityGuard::new(3, 10);
        for i in 0..6 {
            guard.observe("latency_ms", &[("session", &format!("s{i}"))]);
        }
        assert_eq!(guard.alerts_total(), 1);
        let reports = guard.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].severity, CardinalitySeverity::Warning);
        assert_eq!(reports[0].metric, "latency_ms");
    }

    #[test]
    fn test_critical_raised_past_second_threshold() {
        let guard = CardinalityGuard::new(2, 4);
        for i in 0..8 {
            guard.observe("m", &[("k", &format!("v{i}"))]);
        }
        assert_eq!(guard.alerts_total(), 2);
        let severities: Vec<_> = guard.take_reports().into_iter().map(|r| r.severity).collect();
        assert!(severities.contains(&CardinalitySeverity::Critical));
    }

    #[test]
    fn test_bounded_labels_never_alert() {
        let guard = CardinalityGuard::new(5, 10);
        for _ in 0..100 {
            guard.observe("frames", &[("qos", "gold")]);
            guard.observe("frames", &[("qos", "bronze")]);
        }
        assert_eq!(guard.alerts_total(), 0);
    }
}
