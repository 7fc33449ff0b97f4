//! Observation store: daily JSONL files of routing observations.
//!
//! One file per UTC day (`obs-YYYY-MM-DD.jsonl`), one JSON object per
//! line. Appends are idempotent under retry: the dedup key is
//! `(prompt_hash, ts, phase)` and already-present keys are skipped.

use chrono::Utc;
use lattice_core::{ClusterId, ModelId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{AuditError, AuditResult};

/// Current observation schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Which routing phase produced the observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationPhase {
    /// The primary serving path.
    Primary,
    /// An escalation candidate.
    Escalation,
    /// A background shadow evaluation.
    Shadow,
    /// The synchronous seeded shadow draw.
    ShadowSeed,
}

impl ObservationPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Escalation => "escalation",
            Self::Shadow => "shadow",
            Self::ShadowSeed => "shadow_seed",
        }
    }
}

/// One observation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// When the observation was made.
    pub ts: Timestamp,
    /// Stable hash of the prompt (never the prompt itself).
    pub prompt_hash: String,
    /// Task cluster the request was attributed to.
    pub cluster_hint: ClusterId,
    /// The planned candidate order.
    pub model_plan: Vec<ModelId>,
    /// The model that served (or was evaluated).
    pub primary_model: ModelId,
    /// End-to-end latency in seconds.
    pub latency_s: f64,
    /// Input tokens.
    pub tokens_in: u64,
    /// Output tokens.
    pub tokens_out: u64,
    /// Cost in USD.
    pub cost_usd: f64,
    /// Producing phase.
    pub phase: ObservationPhase,
    /// Schema version of this record.
    pub schema_version: u32,
    /// Quality score, when a validator ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
}

impl ObservationRecord {
    fn dedup_key(&self) -> String {
        format!("{}|{}|{}", self.prompt_hash, self.ts, self.phase.as_str())
    }
}

/// Daily-file JSONL store with idempotent append.
pub struct ObservationStore {
    dir: PathBuf,
    state: Mutex<DayState>,
}

struct DayState {
    day: String,
    seen: HashSet<String>,
}

impl ObservationStore {
    /// Open a store rooted at `dir` (created if absent).
    pub fn open(dir: impl Into<PathBuf>) -> AuditResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            state: Mutex::new(DayState {
                day: String::new(),
                seen: HashSet::new(),
            }),
        };
        Ok(store)
    }

    fn file_for(&self, day: &str) -> PathBuf {
        self.dir.join(format!("obs-{day}.jsonl"))
    }

    /// Append a record unless an identical `(prompt_hash, ts, phase)` key
    /// is already present for its day. Returns `true` when written.
    pub fn append(&self, record: &ObservationRecord) -> AuditResult<bool> {
        let day = record.ts.0.format("%Y-%m-%d").to_string();
        let key = record.dedup_key();

        let mut state = self.state.lock().map_err(|_| AuditError::lock())?;
        if state.day != day {
            // Day rollover (or first use): rebuild the dedup set from disk.
            state.seen = self.load_keys(&day)?;
            state.day = day.clone();
        }
        if state.seen.contains(&key) {
            debug!(key, "observation append skipped (duplicate)");
            return Ok(false);
        }

        let line = serde_json::to_string(record)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(&day))?;
        fs2::FileExt::lock_exclusive(&file)?;
        let mut file = file;
        let write_result = writeln!(file, "{line}");
        let _ = fs2::FileExt::unlock(&file);
        write_result?;

        state.seen.insert(key);
        Ok(true)
    }

    /// Read all records for a UTC day (today when `None`).
    pub fn read_day(&self, day: Option<&str>) -> AuditResult<Vec<ObservationRecord>> {
        let day = day.map_or_else(|| Utc::now().format("%Y-%m-%d").to_string(), String::from);
        let path = self.file_for(&day);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    fn load_keys(&self, day: &str) -> AuditResult<HashSet<String>> {
        Ok(self
            .read_day(Some(day))?
            .iter()
            .map(ObservationRecord::dedup_key)
            .collect())
    }
}
