//! End-to-end scenario tests for the Lattice control plane.
//!
//! Shared fixtures live here; the scenarios themselves are under
//! `tests/`.

#![deny(unsafe_code)]
#![deny(clippy::all)]

use lattice_audit::{CustodyLog, ObservationStore};
use lattice_config::Config;
use lattice_core::ModelId;
use lattice_kernel::Kernel;
use lattice_router::{ModelEntry, ModelRegistry, ModelStatus, SafetyGrade};
use std::sync::Arc;

/// Build a registry entry with a sealed manifest hash.
///
/// # Panics
///
/// Panics when sealing fails (test fixture).
#[must_use]
pub fn model_entry(id: &str, status: ModelStatus, cost_per_1k: f64, latency_ms: f64) -> ModelEntry {
    ModelEntry {
        model_id: ModelId::new(id),
        safety_grade: SafetyGrade::B,
        status,
        capabilities: vec!["qa.short".to_string(), "*".to_string()],
        est_latency_ms: latency_ms,
        est_cost_per_1k_tokens_usd: cost_per_1k,
        manifest_hash: String::new(),
    }
    .sealed()
    .expect("sealing a fixture entry")
}

/// Build a kernel over temp-dir stores with the given registry entries.
///
/// # Panics
///
/// Panics when any store fails to open (test fixture).
#[must_use]
pub fn test_kernel(entries: Vec<ModelEntry>) -> (Kernel, tempfile::TempDir) {
    test_kernel_with_config(entries, Config::default())
}

/// Same as [`test_kernel`] but with an explicit config.
///
/// # Panics
///
/// Panics when any store fails to open (test fixture).
#[must_use]
pub fn test_kernel_with_config(
    entries: Vec<ModelEntry>,
    config: Config,
) -> (Kernel, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let custody = Arc::new(
        CustodyLog::open(dir.path().join("custody.jsonl"), b"scenario-key").expect("custody"),
    );
    let observations =
        Arc::new(ObservationStore::open(dir.path().join("observations")).expect("observations"));
    let kernel = Kernel::builder(config)
        .registry(Arc::new(ModelRegistry::in_memory(entries)))
        .custody(custody)
        .observations(observations)
        .build()
        .expect("kernel");
    (kernel, dir)
}
