//! Background threshold cache refresh.
//!
//! Whoever learns that preferences changed calls
//! [`RefreshHandle::request`]. Requests that arrive while a refresh is
//! running are folded into one follow-up refresh. A failed refresh is
//! retried with backoff; if every attempt fails, the previous snapshot
//! stays in use until the next request.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::ThresholdEngine;
use crate::retry::{RetryConfig, with_retry};

/// Requests a cache refresh from a [`CacheRefresher`].
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    notify: Arc<Notify>,
}

impl RefreshHandle {
    /// Ask for a refresh. Never blocks.
    pub fn request(&self) {
        self.notify.notify_one();
    }
}

/// Task that refreshes the threshold cache on request.
#[derive(Debug)]
pub struct CacheRefresher {
    handle: RefreshHandle,
    task: JoinHandle<()>,
}

impl CacheRefresher {
    /// Start the refresh task. It stops when `cancel` is cancelled.
    pub fn spawn(
        engine: Arc<ThresholdEngine>,
        retry: RetryConfig,
        cancel: CancellationToken,
    ) -> Self {
        let notify = Arc::new(Notify::new());
        let task = tokio::spawn(run(engine, retry, notify.clone(), cancel));
        Self {
            handle: RefreshHandle { notify },
            task,
        }
    }

    pub fn handle(&self) -> RefreshHandle {
        self.handle.clone()
    }

    /// Ask for a refresh.
    pub fn request(&self) {
        self.handle.request();
    }

    /// Wait for the task to stop.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn run(
    engine: Arc<ThresholdEngine>,
    retry: RetryConfig,
    notify: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = notify.notified() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = with_retry(&retry, "refresh_cache", || engine.refresh_cache()) => {
                match result {
                    Ok(count) => info!("Loaded thresholds for {} users", count),
                    Err(e) => error!("Threshold refresh failed, keeping previous cache: {}", e),
                }
            }
        }
    }
}
