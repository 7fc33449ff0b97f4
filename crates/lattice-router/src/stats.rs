//! Routing statistics per `(cluster, model)`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lattice_core::{ClusterId, ModelId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{RouterError, RouterResult};

/// Accumulated outcomes for one `(cluster, model)` pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    /// Calls attributed.
    pub calls: u64,
    /// Validated successes.
    pub successes: u64,
    /// Total cost in USD.
    pub cost_sum_usd: f64,
    /// Total latency in seconds.
    pub latency_sum_s: f64,
    /// Last lifecycle change affecting this model (hysteresis input).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_lifecycle_change_ts: Option<DateTime<Utc>>,
}

impl ModelStats {
    /// Success rate, zero before any call.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.successes as f64 / self.calls as f64
    }

    /// Average cost per call, zero before any call.
    #[must_use]
    pub fn avg_cost(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.cost_sum_usd / self.calls as f64
    }

    /// Average latency per call in seconds.
    #[must_use]
    pub fn avg_latency_s(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.latency_sum_s / self.calls as f64
    }
}

/// In-memory stats keyed by `(cluster, model)` with JSON persistence.
pub struct StatsStore {
    stats: DashMap<(ClusterId, ModelId), ModelStats>,
    path: Option<PathBuf>,
}

impl StatsStore {
    /// An empty in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            stats: DashMap::new(),
            path: None,
        }
    }

    /// Open a store backed by a JSON file (missing file = empty store).
    pub fn open(path: impl Into<PathBuf>) -> RouterResult<Self> {
        let path = path.into();
        let stats = DashMap::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let raw: BTreeMap<String, ModelStats> = serde_json::from_str(&text)?;
            for (key, value) in raw {
                if let Some((cluster, model)) = key.split_once('|') {
                    stats.insert(
                        (ClusterId::new(cluster), ModelId::new(model)),
                        value,
                    );
                }
            }
        }
        Ok(Self {
            stats,
            path: Some(path),
        })
    }

    /// Record one call outcome.
    pub fn record(
        &self,
        cluster: &ClusterId,
        model: &ModelId,
        success: bool,
        cost_usd: f64,
        latency_s: f64,
    ) {
        let mut entry = self
            .stats
            .entry((cluster.clone(), model.clone()))
            .or_default();
        entry.calls += 1;
        if success {
            entry.successes += 1;
        }
        entry.cost_sum_usd += cost_usd;
        entry.latency_sum_s += latency_s;
        debug!(cluster = %cluster, model = %model, success, "routing stats recorded");
    }

    /// Stamp a lifecycle change on every cluster row of a model.
    pub fn note_lifecycle_change(&self, model: &ModelId, at: DateTime<Utc>) {
        for mut entry in self.stats.iter_mut() {
            if &entry.key().1 == model {
                entry.value_mut().last_lifecycle_change_ts = Some(at);
            }
        }
    }

    /// Stats for one pair.
    #[must_use]
    pub fn get(&self, cluster: &ClusterId, model: &ModelId) -> Option<ModelStats> {
        self.stats
            .get(&(cluster.clone(), model.clone()))
            .map(|e| e.value().clone())
    }

    /// Total calls recorded across a cluster.
    #[must_use]
    pub fn cluster_calls(&self, cluster: &ClusterId) -> u64 {
        self.stats
            .iter()
            .filter(|e| &e.key().0 == cluster)
            .map(|e| e.value().calls)
            .sum()
    }

    /// All stats rows for a model across clusters, merged.
    #[must_use]
    pub fn model_totals(&self, model: &ModelId) -> ModelStats {
        let mut total = ModelStats::default();
        for entry in &self.stats {
            if &entry.key().1 == model {
                let s = entry.value();
                total.calls += s.calls;
                total.successes += s.successes;
                total.cost_sum_usd += s.cost_sum_usd;
                total.latency_sum_s += s.latency_sum_s;
                if s.last_lifecycle_change_ts > total.last_lifecycle_change_ts {
                    total.last_lifecycle_change_ts = s.last_lifecycle_change_ts;
                }
            }
        }
        total
    }

    /// Persist to the backing file (atomic rewrite).
    pub fn save(&self) -> RouterResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut raw = BTreeMap::new();
        for entry in &self.stats {
            let (cluster, model) = entry.key();
            raw.insert(
                format!("{}|{}", cluster.as_str(), model.as_str()),
                entry.value().clone(),
            );
        }
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &raw)?;
        tmp.persist(path).map_err(|e| RouterError::Io(e.error))?;
        Ok(())
    }
}
