//! File-backed user preferences.
//!
//! The file holds a JSON array of user records:
//!
//! ```json
//! [
//!   {
//!     "name": "alice",
//!     "contactData": { "telegram": 123456789 },
//!     "thresholds": { "temperature": { "max": 30, "timeoutSeconds": 600 } }
//!   }
//! ]
//! ```
//!
//! [`PreferenceWatcher`] polls the file's metadata and asks for a threshold
//! cache refresh whenever it changes.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use thingy_core::{Error, PreferenceStore, RefreshHandle, Result};
use thingy_types::UserPreferences;

/// Reads user preferences from a JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PreferenceStore for JsonFilePreferenceStore {
    /// A missing or unparsable file is an error, so the engine keeps its
    /// previous thresholds while the file is being replaced.
    async fn list_users_with_thresholds(&self) -> Result<Vec<UserPreferences>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::store(format!("failed to read {}: {}", self.path.display(), e)))?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let users: Vec<UserPreferences> = serde_json::from_str(&content)
            .map_err(|e| Error::store(format!("failed to parse {}: {}", self.path.display(), e)))?;

        Ok(users.into_iter().filter(|u| u.has_thresholds()).collect())
    }
}

/// Snapshot of the metadata used to detect changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

async fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some(Fingerprint {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

/// Polls a preference file and requests a refresh when it changes.
#[derive(Debug)]
pub struct PreferenceWatcher {
    task: JoinHandle<()>,
}

impl PreferenceWatcher {
    /// Start watching `path` every `poll_interval`.
    ///
    /// The file's state at start-up is the baseline: no refresh is requested
    /// until it changes. Deleting the file does not request a refresh.
    pub fn spawn(
        path: impl Into<PathBuf>,
        poll_interval: Duration,
        refresh: RefreshHandle,
        cancel: CancellationToken,
    ) -> Self {
        let path = path.into();
        let task = tokio::spawn(async move {
            info!("Watching {} for preference changes", path.display());
            let mut last = fingerprint(&path).await;
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let current = fingerprint(&path).await;
                if current != last {
                    if current.is_some() {
                        debug!("{} changed, requesting threshold refresh", path.display());
                        refresh.request();
                    } else {
                        debug!("{} disappeared", path.display());
                    }
                    last = current;
                }
            }
        });
        Self { task }
    }

    /// Wait for the task to stop.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
