//! Per-message processing: resolve, decode, publish events, evaluate.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use thingy_types::Reading;

use crate::engine::ThresholdEngine;
use crate::error::Result;
use crate::events::{EventDispatcher, EventReceiver, MetricEvent};
use crate::notification::Notification;
use crate::resolver::{InboundMessage, Resolution, TopicResolver};

/// What handling one message produced.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleReport {
    pub resolution: Resolution,
    /// Metric events sent to subscribers.
    pub events: Vec<MetricEvent>,
    /// Notifications produced. Delivery failures are logged, not reported.
    pub notifications: Vec<Notification>,
}

impl HandleReport {
    fn resolved(resolution: Resolution) -> Self {
        Self {
            resolution,
            events: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Whether the message reached the metric sink.
    pub fn forwarded(&self) -> bool {
        matches!(self.resolution, Resolution::Forward(_))
    }
}

/// Runs one inbound message through the resolver and the threshold engine.
#[derive(Debug)]
pub struct Pipeline {
    resolver: TopicResolver,
    engine: Arc<ThresholdEngine>,
    events: EventDispatcher,
}

impl Pipeline {
    pub fn new(
        resolver: TopicResolver,
        engine: Arc<ThresholdEngine>,
        events: EventDispatcher,
    ) -> Self {
        Self {
            resolver,
            engine,
            events,
        }
    }

    pub fn resolver(&self) -> &TopicResolver {
        &self.resolver
    }

    pub fn engine(&self) -> &Arc<ThresholdEngine> {
        &self.engine
    }

    /// Subscribe to metric events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Handle `message` as received now.
    pub async fn handle(&self, message: InboundMessage) -> Result<HandleReport> {
        self.handle_at(message, OffsetDateTime::now_utc()).await
    }

    /// Handle `message` as received at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be decoded or a discovery
    /// request cannot be published. Notification delivery failures are not
    /// errors.
    pub async fn handle_at(
        &self,
        message: InboundMessage,
        now: OffsetDateTime,
    ) -> Result<HandleReport> {
        let resolution = self.resolver.handle(&message, now).await?;
        let Resolution::Forward(decoded) = &resolution else {
            return Ok(HandleReport::resolved(resolution));
        };

        let Some(characteristic) = decoded.characteristic.named() else {
            debug!(
                "No decoder for characteristic {} from {}",
                decoded.characteristic, decoded.device
            );
            return Ok(HandleReport::resolved(resolution));
        };
        let Some(reading) = Reading::decode(characteristic, &decoded.payload)? else {
            return Ok(HandleReport::resolved(resolution));
        };

        let events: Vec<MetricEvent> = reading
            .measurements()
            .into_iter()
            .map(|m| MetricEvent::new(m, decoded.device.as_str(), decoded.address.as_str(), now))
            .collect();
        for event in &events {
            self.events.send(event.clone());
        }

        let mut notifications = Vec::new();
        for (metric, value) in reading.threshold_values() {
            notifications.extend(
                self.engine
                    .evaluate_at(metric, &decoded.address, &decoded.device, value, now)
                    .await,
            );
        }
        if !notifications.is_empty() {
            self.engine.dispatch(&notifications).await;
        }

        Ok(HandleReport {
            resolution,
            events,
            notifications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPreferenceStore, MockTransport};
    use crate::registry::DiscoveryPolicy;
    use thingy_types::{MetricName, uuids};
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);

    async fn pipeline(users: &str) -> (Pipeline, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MockPreferenceStore::with_users(
            serde_json::from_str(users).unwrap(),
        ));
        let engine = Arc::new(ThresholdEngine::new(store, transport.clone()));
        engine.refresh_cache().await.unwrap();
        let resolver = TopicResolver::new(transport.clone(), DiscoveryPolicy::default());
        (
            Pipeline::new(resolver, engine, EventDispatcher::new(16)),
            transport,
        )
    }

    fn name(address: &str, name: &str) -> InboundMessage {
        InboundMessage::new(
            format!("{}/{}/{}", address, uuids::CONFIGURATION_SERVICE, uuids::DEVICE_NAME),
            name.to_string(),
        )
    }

    fn data(
        address: &str,
        service: impl std::fmt::Display,
        characteristic: impl std::fmt::Display,
        payload: &[u8],
    ) -> InboundMessage {
        InboundMessage::new(
            format!("{}/{}/{}", address, service, characteristic),
            payload.to_vec(),
        )
    }

    #[tokio::test]
    async fn test_known_device_emits_events_and_notifications() {
        let (pipeline, transport) =
            pipeline(r#"[{"name":"alice","thresholds":{"eco2":{"max":1000}}}]"#).await;
        let mut events = pipeline.subscribe();
        pipeline.handle_at(name("dev1", "office"), T0).await.unwrap();

        // eco2 = 1200, tvoc = 30
        let msg = data(
            "dev1",
            uuids::ENVIRONMENT_SERVICE,
            uuids::AIR_QUALITY,
            &[0xB0, 0x04, 30, 0],
        );
        let report = pipeline.handle_at(msg, T0).await.unwrap();

        assert!(report.forwarded());
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].metric, MetricName::AirQuality);
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].metric, MetricName::Eco2);

        let received = events.recv().await.unwrap();
        assert_eq!(received.device, "office");
        assert_eq!(transport.published_on("notification").await.len(), 1);
    }

    #[tokio::test]
    async fn test_color_sample_feeds_door_tracker() {
        let (pipeline, _) = pipeline("[]").await;
        pipeline.handle_at(name("dev1", "hall"), T0).await.unwrap();

        // Bright white light: door open
        let payload = [100, 0, 100, 0, 100, 0, 0x90, 0x01];
        let report = pipeline
            .handle_at(data("dev1", uuids::ENVIRONMENT_SERVICE, uuids::COLOR, &payload), T0)
            .await
            .unwrap();
        assert_eq!(report.events.len(), 2);
        assert_eq!(pipeline.engine().open_state().open_since("dev1"), Some(T0));
    }

    #[tokio::test]
    async fn test_parse_error_is_returned() {
        let (pipeline, _) = pipeline("[]").await;
        pipeline.handle_at(name("dev1", "office"), T0).await.unwrap();
        let msg = data("dev1", uuids::ENVIRONMENT_SERVICE, uuids::TEMPERATURE, &[1]);
        assert!(matches!(
            pipeline.handle_at(msg, T0).await,
            Err(crate::Error::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_led_echo_is_not_telemetry() {
        let (pipeline, _) = pipeline("[]").await;
        pipeline.handle_at(name("dev1", "office"), T0).await.unwrap();
        let msg = data("dev1", uuids::USER_INTERFACE_SERVICE, uuids::LED, &[1, 255, 0, 0]);
        let report = pipeline.handle_at(msg, T0).await.unwrap();
        assert!(report.forwarded());
        assert!(report.events.is_empty());
    }
}
