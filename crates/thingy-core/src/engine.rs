//! Threshold evaluation and notification delivery.
//!
//! The engine holds the current [`ThresholdCache`] behind an `Arc`. A
//! refresh fetches from the preference store without holding any lock and
//! then swaps the `Arc`, so evaluations that already took a snapshot finish
//! against it while new evaluations see the replacement.
//!
//! Replacing the snapshot clears every debounce timer: a user who was
//! notified just before a refresh can be notified again right after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use thingy_types::{FieldValue, MetricName};

use crate::error::Result;
use crate::notification::Notification;
use crate::open_state::{OpenState, OpenStateTracker};
use crate::thresholds::ThresholdCache;
use crate::topic::NOTIFICATION_TOPIC;
use crate::traits::{PreferenceStore, Transport};

/// Evaluates metric values against user thresholds.
pub struct ThresholdEngine {
    cache: RwLock<Arc<ThresholdCache>>,
    open_state: OpenStateTracker,
    store: Arc<dyn PreferenceStore>,
    transport: Arc<dyn Transport>,
    refreshes: AtomicU64,
}

impl std::fmt::Debug for ThresholdEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdEngine")
            .field("open_state", &self.open_state)
            .field("refreshes", &self.refreshes.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ThresholdEngine {
    /// Create an engine with an empty cache. Call [`refresh_cache`] before
    /// evaluating.
    ///
    /// [`refresh_cache`]: ThresholdEngine::refresh_cache
    pub fn new(store: Arc<dyn PreferenceStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache: RwLock::new(Arc::new(ThresholdCache::empty())),
            open_state: OpenStateTracker::new(),
            store,
            transport,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Reload every user with thresholds and replace the cache.
    ///
    /// Returns the number of users loaded.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the fetch fails. The previous snapshot
    /// stays in place.
    pub async fn refresh_cache(&self) -> Result<usize> {
        let users = self.store.list_users_with_thresholds().await?;
        let cache = Arc::new(ThresholdCache::from_users(users));
        let count = cache.len();

        *self.cache.write().await = cache;
        let generation = self.refreshes.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Threshold cache refreshed: {} users (generation {})",
            count, generation
        );
        Ok(count)
    }

    /// The current snapshot.
    pub async fn snapshot(&self) -> Arc<ThresholdCache> {
        self.cache.read().await.clone()
    }

    /// Number of successful refreshes so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn open_state(&self) -> &OpenStateTracker {
        &self.open_state
    }

    /// Evaluate `value` for `metric` on the device at `address` at `now`
    /// without delivering. `device` is the friendly name used in the
    /// notification text.
    ///
    /// For [`MetricName::Door`] the value is the open flag. It is converted
    /// to the number of seconds the door at `address` has been open; closing
    /// the door or the first open report produces no notifications. The
    /// tracker is updated even when no user has a door rule.
    pub async fn evaluate_at(
        &self,
        metric: MetricName,
        address: &str,
        device: &str,
        value: FieldValue,
        now: OffsetDateTime,
    ) -> Vec<Notification> {
        let value = if metric == MetricName::Door {
            match self.open_state.update(address, is_set(value), now) {
                OpenState::Closed | OpenState::Opened => return Vec::new(),
                OpenState::OpenFor(seconds) => seconds,
            }
        } else {
            value.as_f64()
        };

        let cache = self.snapshot().await;
        cache
            .rules_for(metric)
            .filter_map(|(user, rule)| {
                rule.try_trigger(value, now).map(|violation| Notification {
                    user: user.name.clone(),
                    contact: user.contact.clone(),
                    metric,
                    device: device.to_string(),
                    value,
                    violation,
                })
            })
            .collect()
    }

    /// Publish each notification. Failures are logged and skipped.
    ///
    /// Returns the number delivered.
    pub async fn dispatch(&self, notifications: &[Notification]) -> usize {
        let mut delivered = 0;
        for notification in notifications {
            let payload = match notification.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode notification for {}: {}", notification.user, e);
                    continue;
                }
            };
            match self.transport.publish(NOTIFICATION_TOPIC, &payload).await {
                Ok(()) => {
                    debug!(
                        "Notified {} about {} on {}",
                        notification.user, notification.metric, notification.device
                    );
                    delivered += 1;
                }
                Err(e) => warn!("Failed to deliver notification to {}: {}", notification.user, e),
            }
        }
        delivered
    }

    /// Evaluate `value` now and deliver the resulting notifications.
    pub async fn evaluate(
        &self,
        metric: MetricName,
        address: &str,
        device: &str,
        value: FieldValue,
    ) -> Vec<Notification> {
        let notifications = self
            .evaluate_at(metric, address, device, value, OffsetDateTime::now_utc())
            .await;
        if !notifications.is_empty() {
            self.dispatch(&notifications).await;
        }
        notifications
    }
}

fn is_set(value: FieldValue) -> bool {
    match value {
        FieldValue::Flag(flag) => flag,
        FieldValue::Number(n) => n != 0.0,
    }
}
