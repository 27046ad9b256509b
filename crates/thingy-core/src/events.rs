//! Metric events emitted for every decoded message.
//!
//! Telemetry stores and other consumers subscribe through an
//! [`EventDispatcher`]. Events are broadcast: a subscriber that falls behind
//! loses the oldest events, and sending never blocks the pipeline.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use thingy_types::{FieldValue, Measurement, MetricName};

/// One measurement from a named device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub metric: MetricName,
    /// Friendly device name.
    pub device: String,
    pub address: String,
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl MetricEvent {
    pub fn new(
        measurement: Measurement,
        device: impl Into<String>,
        address: impl Into<String>,
        observed_at: OffsetDateTime,
    ) -> Self {
        Self {
            metric: measurement.metric,
            device: device.into(),
            address: address.into(),
            fields: measurement.fields,
            observed_at,
        }
    }
}

/// Sender for metric events.
pub type EventSender = broadcast::Sender<MetricEvent>;

/// Receiver for metric events.
pub type EventReceiver = broadcast::Receiver<MetricEvent>;

/// Fans metric events out to every subscriber.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: MetricEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
