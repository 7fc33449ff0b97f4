//! Safe-mode config loading: retry, then fall back to last-known-good.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::loader;
use crate::types::Config;

/// Wraps config loading with retry and a last-known-good snapshot.
///
/// A failed reload is retried `max_retries` times with `retry_delay_s`
/// between attempts. When all attempts fail the last validated snapshot
/// stays in force and safe mode is flagged; the next successful load
/// clears it.
pub struct SafeModeLoader {
    path: Option<PathBuf>,
    last_good: RwLock<Option<Config>>,
    safe_mode_active: AtomicBool,
    safe_mode_entries: AtomicU64,
}

impl SafeModeLoader {
    /// Create a loader for the given overlay path (`None` = defaults only).
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            last_good: RwLock::new(None),
            safe_mode_active: AtomicBool::new(false),
            safe_mode_entries: AtomicU64::new(0),
        }
    }

    /// Whether the loader is currently serving a last-known-good snapshot.
    #[must_use]
    pub fn safe_mode_active(&self) -> bool {
        self.safe_mode_active.load(Ordering::Relaxed)
    }

    /// Times safe mode has been entered (`safe_mode_entries_total`).
    #[must_use]
    pub fn safe_mode_entries(&self) -> u64 {
        self.safe_mode_entries.load(Ordering::Relaxed)
    }

    /// Load (or reload) the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ECFG` only when every attempt fails *and* no last-known-good
    /// snapshot exists (first load of a broken deployment).
    pub async fn load(&self) -> ConfigResult<Config> {
        let retry = {
            // Retry policy comes from the last good config when present,
            // falling back to compiled defaults on first load.
            let guard = self.last_good.read().ok();
            guard
                .and_then(|g| g.as_ref().map(|c| c.agp.safe_mode.clone()))
                .unwrap_or_default()
        };

        let mut last_err: Option<ConfigError> = None;
        for attempt in 0..=retry.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(retry.retry_delay_s)).await;
            }
            match loader::load(self.path.as_deref()) {
                Ok(config) => {
                    if self.safe_mode_active.swap(false, Ordering::Relaxed) {
                        info!("config load succeeded, exiting safe mode");
                    }
                    if let Ok(mut guard) = self.last_good.write() {
                        *guard = Some(config.clone());
                    }
                    return Ok(config);
                },
                Err(e) => {
                    warn!(attempt, error = %e, "config load attempt failed");
                    last_err = Some(e);
                },
            }
        }

        let fallback = self.last_good.read().ok().and_then(|g| g.clone());
        match fallback {
            Some(config) => {
                self.safe_mode_entries.fetch_add(1, Ordering::Relaxed);
                self.safe_mode_active.store(true, Ordering::Relaxed);
                error!("ERROR: ECFG - all config load attempts failed, using last-known-good");
                Ok(config)
            },
            None => Err(last_err
                .unwrap_or_else(|| ConfigError::Invalid("no config and no snapshot".to_string()))),
        }
    }
}
