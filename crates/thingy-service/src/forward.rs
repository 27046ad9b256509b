//! Re-publishes metric events for downstream consumers.
//!
//! Each event goes to `{prefix}/{device}/{measurement}/json` as the JSON
//! form of [`MetricEvent`]. These topics have at least four levels, so the
//! service's own `+/+` and `+/+/+` subscriptions never match them.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use thingy_core::{EventReceiver, MetricEvent, Transport};

use crate::mqtt::sanitize_topic_segment;

/// Topic a metric event is forwarded to.
pub fn forward_topic(prefix: &str, event: &MetricEvent) -> String {
    format!(
        "{}/{}/{}/json",
        prefix,
        sanitize_topic_segment(&event.device),
        event.metric.as_str()
    )
}

/// Background task forwarding metric events.
///
/// Stops once every event sender has been dropped, after forwarding what
/// was already buffered.
#[derive(Debug)]
pub struct MetricForwarder {
    task: JoinHandle<u64>,
}

impl MetricForwarder {
    pub fn spawn(events: EventReceiver, transport: Arc<dyn Transport>, prefix: String) -> Self {
        info!("Forwarding metric events under '{}'", prefix);
        let task = tokio::spawn(run(events, transport, prefix));
        Self { task }
    }

    /// Wait for the task and return the number of events forwarded.
    pub async fn join(self) -> u64 {
        self.task.await.unwrap_or(0)
    }
}

async fn run(mut events: EventReceiver, transport: Arc<dyn Transport>, prefix: String) -> u64 {
    let mut forwarded = 0;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Metric forwarder lagged, missed {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {} event from {}: {}", event.metric, event.device, e);
                continue;
            }
        };
        let topic = forward_topic(&prefix, &event);
        match transport.publish(&topic, &payload).await {
            Ok(()) => forwarded += 1,
            Err(e) => warn!("Failed to forward metric event: {}", e),
        }
    }

    debug!("Metric forwarder stopped after {} events", forwarded);
    forwarded
}
