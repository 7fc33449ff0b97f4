//! The model registry.
//!
//! A JSON array on disk, validated on load: each entry's `manifest_hash`
//! (16-hex truncated SHA-256 of the record with the hash field excluded)
//! must match its recomputed value. In memory the registry is
//! copy-on-write: readers hold an `Arc` snapshot and never block;
//! lifecycle changes build a new snapshot, persist it via temp-file +
//! rename, and swap the pointer.

use lattice_core::ModelId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::error::{RouterError, RouterResult};

/// Safety grade, A strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyGrade {
    /// Strongest assurance.
    A,
    /// Strong assurance.
    B,
    /// Moderate assurance.
    C,
    /// Minimal assurance.
    D,
}

impl SafetyGrade {
    fn rank(self) -> u8 {
        match self {
            Self::A => 3,
            Self::B => 2,
            Self::C => 1,
            Self::D => 0,
        }
    }

    /// Whether this grade satisfies a required minimum.
    #[must_use]
    pub fn meets(self, required: SafetyGrade) -> bool {
        self.rank() >= required.rank()
    }
}

/// Model lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Serves primary traffic.
    Active,
    /// Evaluation traffic only; excluded from primary selection.
    Shadow,
    /// Used when actives are unavailable.
    Fallback,
    /// Retired.
    Deprecated,
}

/// One registry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier.
    pub model_id: ModelId,
    /// Safety grade.
    pub safety_grade: SafetyGrade,
    /// Lifecycle status.
    pub status: ModelStatus,
    /// Capabilities (task types this model covers).
    pub capabilities: Vec<String>,
    /// Estimated latency in milliseconds.
    pub est_latency_ms: f64,
    /// Estimated cost per 1k tokens in USD.
    pub est_cost_per_1k_tokens_usd: f64,
    /// 16-hex truncated SHA-256 of this record with the hash excluded.
    pub manifest_hash: String,
}

impl ModelEntry {
    /// Recompute the manifest hash over this record minus the hash field.
    pub fn compute_manifest_hash(&self) -> RouterResult<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("manifest_hash");
        }
        let digest = Sha256::digest(value.to_string().as_bytes());
        Ok(hex::encode(digest)[..16].to_string())
    }

    /// Fill in the manifest hash.
    pub fn sealed(mut self) -> RouterResult<Self> {
        self.manifest_hash = self.compute_manifest_hash()?;
        Ok(self)
    }

    /// Whether this model can serve `task_type`.
    #[must_use]
    pub fn covers(&self, task_type: &str) -> bool {
        self.capabilities.iter().any(|c| c == task_type || c == "*")
    }
}

/// Copy-on-write model registry.
pub struct ModelRegistry {
    path: Option<PathBuf>,
    snapshot: RwLock<Arc<Vec<ModelEntry>>>,
}

impl ModelRegistry {
    /// An empty in-memory registry (tests, bootstrapping).
    #[must_use]
    pub fn in_memory(entries: Vec<ModelEntry>) -> Self {
        Self {
            path: None,
            snapshot: RwLock::new(Arc::new(entries)),
        }
    }

    /// Load a registry from its JSON file, validating every manifest hash.
    pub fn load(path: impl Into<PathBuf>) -> RouterResult<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        let entries: Vec<ModelEntry> = serde_json::from_str(&text)?;
        for entry in &entries {
            let computed = entry.compute_manifest_hash()?;
            if computed != entry.manifest_hash {
                return Err(RouterError::ManifestMismatch {
                    model_id: entry.model_id.clone(),
                });
            }
        }
        info!(path = %path.display(), models = entries.len(), "model registry loaded");
        Ok(Self {
            path: Some(path),
            snapshot: RwLock::new(Arc::new(entries)),
        })
    }

    /// Reload from disk (config/SIGHUP-style trigger). Validation failures
    /// leave the current snapshot in place.
    pub fn reload(&self) -> RouterResult<usize> {
        let Some(path) = &self.path else {
            return Err(RouterError::NotPersistent);
        };
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<ModelEntry> = serde_json::from_str(&text)?;
        for entry in &entries {
            if entry.compute_manifest_hash()? != entry.manifest_hash {
                warn!(model = %entry.model_id, "registry reload rejected: manifest mismatch");
                return Err(RouterError::ManifestMismatch {
                    model_id: entry.model_id.clone(),
                });
            }
        }
        let count = entries.len();
        *self.snapshot.write().map_err(|_| RouterError::poisoned())? = Arc::new(entries);
        Ok(count)
    }

    /// Current snapshot; readers never block writers.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<ModelEntry>> {
        self.snapshot
            .read()
            .map(|g| Arc::clone(&g))
            .unwrap_or_else(|_| Arc::new(Vec::new()))
    }

    /// Find an entry in the current snapshot.
    #[must_use]
    pub fn get(&self, model_id: &ModelId) -> Option<ModelEntry> {
        self.snapshot().iter().find(|e| &e.model_id == model_id).cloned()
    }

    /// Atomically change a model's status: build a new snapshot, persist
    /// it (temp-file + rename), then swap the pointer.
    pub fn set_status(&self, model_id: &ModelId, status: ModelStatus) -> RouterResult<()> {
        let current = self.snapshot();
        let mut next: Vec<ModelEntry> = (*current).clone();
        let entry = next
            .iter_mut()
            .find(|e| &e.model_id == model_id)
            .ok_or_else(|| RouterError::UnknownModel(model_id.clone()))?;
        entry.status = status;
        // Status is part of the hashed record; reseal.
        *entry = entry.clone().sealed()?;

        self.persist(&next)?;
        *self.snapshot.write().map_err(|_| RouterError::poisoned())? = Arc::new(next);
        info!(model = %model_id, ?status, "model status changed");
        Ok(())
    }

    fn persist(&self, entries: &[ModelEntry]) -> RouterResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, entries)?;
        tmp.persist(path).map_err(|e| RouterError::Io(e.error))?;
        Ok(())
    }
}
