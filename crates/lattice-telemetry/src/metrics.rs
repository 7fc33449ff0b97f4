//! Process-local metric registry.
//!
//! Counters and gauges are lock-free atomics; histograms use fixed bucket
//! sets with a small mutex-free layout (per-bucket atomic counts). Labeled
//! series are keyed by metric name plus sorted label pairs; every labeled
//! observation is routed through the cardinality guard.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cardinality::CardinalityGuard;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge holding an `f64` (stored as bits in an atomic).
#[derive(Debug, Default)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    /// Set the gauge.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A histogram with a fixed bucket set.
///
/// `buckets` are upper bounds in ascending order; an implicit +inf bucket
/// catches the remainder. Counts are cumulative-free (per bucket), with a
/// separate sum and total.
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    total: AtomicU64,
}

impl Histogram {
    fn new(bounds: &[f64]) -> Self {
        let mut counts = Vec::with_capacity(bounds.len() + 1);
        for _ in 0..=bounds.len() {
            counts.push(AtomicU64::new(0));
        }
        Self {
            bounds: bounds.to_vec(),
            counts,
            sum_bits: AtomicU64::new(0f64.to_bits()),
            total: AtomicU64::new(0),
        }
    }

    /// Record an observation.
    pub fn observe(&self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.bounds.len());
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        // CAS loop for the float sum.
        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Per-bucket counts (the final slot is the +inf bucket).
    #[must_use]
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Upper bounds of the configured buckets.
    #[must_use]
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Total observation count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Sum of observations.
    #[must_use]
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }
}

/// Point-in-time snapshot of every registered series, for export and tests.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Counter values by series key.
    pub counters: std::collections::BTreeMap<String, u64>,
    /// Gauge values by series key.
    pub gauges: std::collections::BTreeMap<String, f64>,
    /// Histogram `(bucket_counts, sum)` by series key.
    pub histograms: std::collections::BTreeMap<String, (Vec<u64>, f64)>,
}

/// Registry of counters, gauges, and histograms.
///
/// One registry per process, owned by the kernel and passed down by
/// handle. Series are created lazily on first touch.
pub struct MetricsRegistry {
    counters: DashMap<String, Arc<Counter>>,
    gauges: DashMap<String, Arc<Gauge>>,
    histograms: DashMap<String, Arc<Histogram>>,
    guard: CardinalityGuard,
}

impl MetricsRegistry {
    /// Create an empty registry with default cardinality thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            guard: CardinalityGuard::default(),
        }
    }

    /// The cardinality guard attached to this registry.
    #[must_use]
    pub fn cardinality(&self) -> &CardinalityGuard {
        &self.guard
    }

    /// Fetch or create an unlabeled counter.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::default()))
            .clone()
    }

    /// Fetch or create a labeled counter series.
    pub fn counter_with(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Counter> {
        self.guard.observe(name, labels);
        self.counters
            .entry(series_key(name, labels))
            .or_insert_with(|| Arc::new(Counter::default()))
            .clone()
    }

    /// Fetch or create an unlabeled gauge.
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Gauge::default()))
            .clone()
    }

    /// Fetch or create a labeled gauge series.
    pub fn gauge_with(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Gauge> {
        self.guard.observe(name, labels);
        self.gauges
            .entry(series_key(name, labels))
            .or_insert_with(|| Arc::new(Gauge::default()))
            .clone()
    }

    /// Fetch or create a histogram with a fixed bucket set.
    ///
    /// The bucket set is fixed on first creation; later calls with a
    /// different set get the existing histogram.
    pub fn histogram(&self, name: &str, bounds: &[f64]) -> Arc<Histogram> {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new(bounds)))
            .clone()
    }

    /// Snapshot every series.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|e| (e.key().clone(), e.value().get()))
                .collect(),
            gauges: self
                .gauges
                .iter()
                .map(|e| (e.key().clone(), e.value().get()))
                .collect(),
            histograms: self
                .histograms
                .iter()
                .map(|e| {
                    (
                        e.key().clone(),
                        (e.value().bucket_counts(), e.value().sum()),
                    )
                })
                .collect(),
        }
    }

    /// Convenience: value of an unlabeled counter (0 when absent).
    #[must_use]
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters.get(name).map_or(0, |c| c.get())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(&str, &str)> = labels.to_vec();
    pairs.sort_unstable();
    let mut key = name.to_string();
    for (k, v) in pairs {
        key.push('{');
        key.push_str(k);
        key.push('=');
        key.push_str(v);
        key.push('}');
    }
    key
}
