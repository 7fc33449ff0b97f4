//! Promotion/demotion of models with hysteresis and custody logging.
//!
//! After each lifecycle-relevant event the engine evaluates:
//! - a shadow with enough calls whose average cost beats
//!   `cost_improve * avg_cost(primary)` is promoted to active;
//! - an active with enough calls whose average cost exceeds
//!   `cost_regress * avg_cost(cheapest active)` is demoted to deprecated.
//!
//! A model whose last lifecycle change is within the hysteresis window is
//! skipped. Every change is an atomic registry write plus a custody record.

use chrono::Utc;
use lattice_audit::{CustodyEvent, CustodyLog};
use lattice_config::{DemoteSection, PromoteSection};
use lattice_core::{ClusterId, ModelId};
use lattice_telemetry::MetricsRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::RouterResult;
use crate::registry::{ModelRegistry, ModelStatus};
use crate::stats::StatsStore;

/// Evaluates and applies model lifecycle changes.
pub struct LifecycleEngine {
    registry: Arc<ModelRegistry>,
    stats: Arc<StatsStore>,
    custody: Arc<CustodyLog>,
    metrics: Arc<MetricsRegistry>,
    promote: PromoteSection,
    demote: DemoteSection,
    hysteresis: Duration,
}

impl LifecycleEngine {
    /// Wire the engine to its stores.
    #[must_use]
    pub fn new(
        registry: Arc<ModelRegistry>,
        stats: Arc<StatsStore>,
        custody: Arc<CustodyLog>,
        metrics: Arc<MetricsRegistry>,
        promote: PromoteSection,
        demote: DemoteSection,
        hysteresis_sec: u64,
    ) -> Self {
        Self {
            registry,
            stats,
            custody,
            metrics,
            promote,
            demote,
            hysteresis: Duration::from_secs(hysteresis_sec),
        }
    }

    /// Evaluate promotions and demotions for one cluster. Returns the
    /// models whose status changed.
    pub fn evaluate(&self, cluster: &ClusterId) -> RouterResult<Vec<ModelId>> {
        let mut changed = Vec::new();
        let snapshot = self.registry.snapshot();

        let actives: Vec<_> = snapshot
            .iter()
            .filter(|e| e.status == ModelStatus::Active)
            .collect();
        let primary_avg_cost = actives
            .iter()
            .filter_map(|e| self.stats.get(cluster, &e.model_id))
            .filter(|s| s.calls > 0)
            .map(|s| s.avg_cost())
            .fold(f64::NAN, f64::min);
        let cheapest_active_cost = primary_avg_cost;

        // Promotions: shadow beating the active cost frontier.
        for entry in snapshot.iter().filter(|e| e.status == ModelStatus::Shadow) {
            if self.in_hysteresis(&entry.model_id) {
                continue;
            }
            let Some(stats) = self.stats.get(cluster, &entry.model_id) else {
                continue;
            };
            if stats.calls < self.promote.min_calls || primary_avg_cost.is_nan() {
                continue;
            }
            if stats.avg_cost() < self.promote.cost_improve * primary_avg_cost {
                self.apply(
                    &entry.model_id,
                    ModelStatus::Active,
                    CustodyEvent::Promote,
                    format!(
                        "avg_cost {:.6} < {:.2} * {:.6}",
                        stats.avg_cost(),
                        self.promote.cost_improve,
                        primary_avg_cost
                    ),
                )?;
                self.metrics.counter("promotions_total").inc();
                changed.push(entry.model_id.clone());
            }
        }

        // Demotions: active regressing against the cheapest active.
        for entry in &actives {
            if self.in_hysteresis(&entry.model_id) {
                continue;
            }
            let Some(stats) = self.stats.get(cluster, &entry.model_id) else {
                continue;
            };
            if stats.calls < self.demote.min_calls || cheapest_active_cost.is_nan() {
                continue;
            }
            if stats.avg_cost() > self.demote.cost_regress * cheapest_active_cost {
                self.apply(
                    &entry.model_id,
                    ModelStatus::Deprecated,
                    CustodyEvent::Demote,
                    format!(
                        "avg_cost {:.6} > {:.2} * {:.6}",
                        stats.avg_cost(),
                        self.demote.cost_regress,
                        cheapest_active_cost
                    ),
                )?;
                self.metrics.counter("demotions_total").inc();
                changed.push(entry.model_id.clone());
            }
        }

        Ok(changed)
    }

    fn apply(
        &self,
        model_id: &ModelId,
        status: ModelStatus,
        event: CustodyEvent,
        detail: String,
    ) -> RouterResult<()> {
        // Custody first: if the chain is read-only the lifecycle change
        // must not happen either.
        self.custody.append(event, model_id, Some(detail))?;
        self.registry.set_status(model_id, status)?;
        self.stats.note_lifecycle_change(model_id, Utc::now());
        info!(model = %model_id, ?status, "lifecycle change applied");
        Ok(())
    }

    fn in_hysteresis(&self, model_id: &ModelId) -> bool {
        let totals = self.stats.model_totals(model_id);
        totals.last_lifecycle_change_ts.is_some_and(|ts| {
            Utc::now()
                .signed_duration_since(ts)
                .to_std()
                .map_or(true, |elapsed| elapsed < self.hysteresis)
        })
    }
}
