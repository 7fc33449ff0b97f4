//! Custody log: hash-chained, HMAC'd model lifecycle records.
//!
//! Each line is a JSON object `{event, prev_hash, hash, hmac, ...}`. The
//! hash covers the record content plus `prev_hash`; the HMAC covers the
//! hash. Verification walks the chain from the first line; any mismatch
//! flips the log read-only so a tampered chain is never extended.

use hmac::{Hmac, Mac};
use lattice_core::{ModelId, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{error, info};

use crate::error::{AuditError, AuditResult};

type HmacSha256 = Hmac<Sha256>;

/// Model lifecycle events recorded in the custody chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyEvent {
    /// Model artifact was built.
    Build,
    /// Model artifact was scanned.
    Scan,
    /// Model artifact was signed.
    Sign,
    /// Model was deployed.
    Deploy,
    /// Shadow model was promoted to active.
    Promote,
    /// Active model was demoted.
    Demote,
}

/// One custody log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyRecord {
    /// When the event happened.
    pub ts: Timestamp,
    /// The lifecycle event.
    pub event: CustodyEvent,
    /// The model the event concerns.
    pub model_id: ModelId,
    /// Free-form detail (e.g. promotion rationale).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Hash of the previous record ("0" * 64 for the genesis record).
    pub prev_hash: String,
    /// SHA-256 over this record's content plus `prev_hash`.
    pub hash: String,
    /// HMAC-SHA256 over `hash`.
    pub hmac: String,
}

impl CustodyRecord {
    /// The bytes covered by `hash`: everything except `hash` and `hmac`.
    fn content_bytes(&self) -> Vec<u8> {
        let content = serde_json::json!({
            "ts": self.ts,
            "event": self.event,
            "model_id": self.model_id,
            "detail": self.detail,
            "prev_hash": self.prev_hash,
        });
        content.to_string().into_bytes()
    }

    fn compute_hash(&self) -> String {
        hex::encode(Sha256::digest(self.content_bytes()))
    }
}

/// Genesis predecessor hash.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Append-only custody log backed by a JSONL file.
pub struct CustodyLog {
    path: PathBuf,
    key: Vec<u8>,
    last_hash: Mutex<String>,
    read_only: AtomicBool,
}

impl CustodyLog {
    /// Open (or create) a custody log, verifying any existing chain.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] when the existing file fails
    /// verification; the log is then usable read-only.
    pub fn open(path: impl Into<PathBuf>, key: &[u8]) -> AuditResult<Self> {
        let log = Self {
            path: path.into(),
            key: key.to_vec(),
            last_hash: Mutex::new(GENESIS_HASH.to_string()),
            read_only: AtomicBool::new(false),
        };
        if log.path.exists() {
            match log.verify_chain() {
                Ok(records) => {
                    if let Some(last) = records.last() {
                        *log.last_hash.lock().map_err(|_| AuditError::lock())? =
                            last.hash.clone();
                    }
                    info!(path = %log.path.display(), records = records.len(), "custody chain verified");
                },
                Err(e) => {
                    log.read_only.store(true, Ordering::Relaxed);
                    error!(path = %log.path.display(), error = %e, "custody chain broken, log is read-only");
                    return Err(e);
                },
            }
        }
        Ok(log)
    }

    /// Whether writes have been halted by a verification failure.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    /// Append a lifecycle event to the chain.
    pub fn append(
        &self,
        event: CustodyEvent,
        model_id: &ModelId,
        detail: Option<String>,
    ) -> AuditResult<CustodyRecord> {
        if self.is_read_only() {
            return Err(AuditError::ReadOnly);
        }
        let mut last = self.last_hash.lock().map_err(|_| AuditError::lock())?;

        let mut record = CustodyRecord {
            ts: Timestamp::now(),
            event,
            model_id: model_id.clone(),
            detail,
            prev_hash: last.clone(),
            hash: String::new(),
            hmac: String::new(),
        };
        record.hash = record.compute_hash();
        record.hmac = self.mac(&record.hash)?;

        let line = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        fs2::FileExt::lock_exclusive(&file)?;
        let write_result = writeln!(file, "{line}");
        let _ = fs2::FileExt::unlock(&file);
        write_result?;

        *last = record.hash.clone();
        Ok(record)
    }

    /// Walk the chain from the first line, verifying linkage, hashes, and
    /// MACs. Returns the verified records.
    pub fn verify_chain(&self) -> AuditResult<Vec<CustodyRecord>> {
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut prev = GENESIS_HASH.to_string();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: CustodyRecord = serde_json::from_str(&line)?;
            if record.prev_hash != prev {
                return Err(AuditError::ChainBroken {
                    line: idx,
                    reason: "prev_hash does not match preceding record".to_string(),
                });
            }
            if record.compute_hash() != record.hash {
                return Err(AuditError::ChainBroken {
                    line: idx,
                    reason: "record hash mismatch".to_string(),
                });
            }
            if self.mac(&record.hash)? != record.hmac {
                return Err(AuditError::ChainBroken {
                    line: idx,
                    reason: "record hmac mismatch".to_string(),
                });
            }
            prev = record.hash.clone();
            records.push(record);
        }
        Ok(records)
    }

    fn mac(&self, hash: &str) -> AuditResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AuditError::Crypto(e.to_string()))?;
        mac.update(hash.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> ModelId {
        ModelId::new(name)
    }

    #[test]
    fn test_append_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.jsonl");
        let log = CustodyLog::open(&path, b"chain-key").unwrap();

        log.append(CustodyEvent::Deploy, &model("slm-1"), None).unwrap();
        log.append(
            CustodyEvent::Promote,
            &model("slm-1"),
            Some("cost 0.003 < 0.9 * 0.005".to_string()),
        )
        .unwrap();

        let records = log.verify_chain().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prev_hash, GENESIS_HASH);
        assert_eq!(records[1].prev_hash, records[0].hash);
    }

    #[test]
    fn test_reopen_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.jsonl");
        {
            let log = CustodyLog::open(&path, b"chain-key").unwrap();
            log.append(CustodyEvent::Build, &model("m"), None).unwrap();
        }
        let log = CustodyLog::open(&path, b"chain-key").unwrap();
        log.append(CustodyEvent::Scan, &model("m"), None).unwrap();
        assert_eq!(log.verify_chain().unwrap().len(), 2);
    }

    #[test]
    fn test_tampering_detected_and_writes_halt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.jsonl");
        {
            let log = CustodyLog::open(&path, b"chain-key").unwrap();
            log.append(CustodyEvent::Deploy, &model("m"), None).unwrap();
            log.append(CustodyEvent::Promote, &model("m"), None).unwrap();
        }
        // Tamper: flip the event on the first line.
        let text = std::fs::read_to_string(&path).unwrap();
        let tampered = text.replacen("\"deploy\"", "\"demote\"", 1);
        std::fs::write(&path, tampered).unwrap();

        let result = CustodyLog::open(&path, b"chain-key");
        assert!(matches!(result, Err(AuditError::ChainBroken { .. })));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.jsonl");
        {
            let log = CustodyLog::open(&path, b"key-a").unwrap();
            log.append(CustodyEvent::Sign, &model("m"), None).unwrap();
        }
        assert!(CustodyLog::open(&path, b"key-b").is_err());
    }

    #[test]
    fn test_read_only_log_rejects_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.jsonl");
        let log = CustodyLog::open(&path, b"k").unwrap();
        log.read_only.store(true, Ordering::Relaxed);
        assert!(matches!(
            log.append(CustodyEvent::Build, &model("m"), None),
            Err(AuditError::ReadOnly)
        ));
    }
}
