//! Topic resolution and the discovery handshake.
//!
//! [`TopicResolver::handle`] turns every inbound message into a
//! [`Resolution`]. Messages from devices without a name are not forwarded:
//! the first one triggers a read of the device name characteristic, and the
//! answer (which is not forwarded either) completes discovery.

use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use thingy_types::readings::decode_name;
use thingy_types::{CharacteristicId, CharacteristicName, ServiceId, ServiceName};

use crate::error::Result;
use crate::registry::{DeviceRegistry, DiscoveryDecision, DiscoveryPolicy, NameAssignment};
use crate::topic::{Topic, discovery_topic};
use crate::traits::Transport;

/// A raw message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Device address segment, used for routing. Empty for topics without one.
    pub fn address(&self) -> &str {
        self.topic.split('/').next().unwrap_or_default()
    }
}

/// A message from a known device, ready for decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub address: String,
    /// Friendly device name.
    pub device: String,
    pub service: ServiceId,
    pub characteristic: CharacteristicId,
    pub payload: Bytes,
}

/// Outcome of resolving one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The topic could not be decoded; the message was dropped.
    Malformed,
    /// A connect or disconnect report.
    Connectivity {
        address: String,
        connected: bool,
        /// A name request was issued because the device is unknown.
        discovery_requested: bool,
    },
    /// The device is unknown; a name request was published and the message
    /// was dropped.
    DiscoveryRequested { address: String, attempt: u32 },
    /// A name request is outstanding; the message was dropped.
    AwaitingName { address: String },
    /// The device reported its name.
    Named {
        address: String,
        name: String,
        assignment: NameAssignment,
    },
    /// The message should be forwarded.
    Forward(DecodedMessage),
}

/// Decodes topics, learns device names and drives discovery.
pub struct TopicResolver {
    registry: DeviceRegistry,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for TopicResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicResolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl TopicResolver {
    pub fn new(transport: Arc<dyn Transport>, policy: DiscoveryPolicy) -> Self {
        Self {
            registry: DeviceRegistry::new(policy),
            transport,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Resolve `message` received at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if a device name payload cannot be decoded or a
    /// discovery request cannot be published. In both cases the message is
    /// dropped and the device stays undiscovered.
    pub async fn handle(&self, message: &InboundMessage, now: OffsetDateTime) -> Result<Resolution> {
        let Some(topic) = Topic::parse(&message.topic) else {
            warn!("Dropping message on malformed topic '{}'", message.topic);
            return Ok(Resolution::Malformed);
        };

        match topic {
            Topic::Connectivity { address, service } => {
                if !service.is(ServiceName::Connectivity) {
                    warn!(
                        "Dropping message on '{}': service {} has no characteristic",
                        message.topic, service
                    );
                    return Ok(Resolution::Malformed);
                }
                self.handle_connectivity(address, &message.payload, now).await
            }
            Topic::Data {
                address,
                service,
                characteristic,
            } => {
                if characteristic.is(CharacteristicName::DeviceName) {
                    let name = decode_name(&message.payload)?;
                    let assignment = self.registry.record_name(&address, &name).await;
                    if assignment == NameAssignment::Assigned {
                        info!("Discovered device {} named '{}'", address, name);
                    }
                    return Ok(Resolution::Named {
                        address,
                        name,
                        assignment,
                    });
                }

                match self.registry.begin_discovery(&address, now).await {
                    DiscoveryDecision::Known(device) => Ok(Resolution::Forward(DecodedMessage {
                        address,
                        device,
                        service,
                        characteristic,
                        payload: message.payload.clone(),
                    })),
                    DiscoveryDecision::Request { attempt } => {
                        self.request_name(&address, attempt).await?;
                        Ok(Resolution::DiscoveryRequested { address, attempt })
                    }
                    DiscoveryDecision::Pending => {
                        debug!("Dropping message from {}: waiting for its name", address);
                        Ok(Resolution::AwaitingName { address })
                    }
                }
            }
        }
    }

    async fn handle_connectivity(
        &self,
        address: String,
        payload: &[u8],
        now: OffsetDateTime,
    ) -> Result<Resolution> {
        let connected = is_connected_payload(payload);
        info!(
            "Device {} {}",
            address,
            if connected { "connected" } else { "disconnected" }
        );

        if !connected {
            self.registry.observe(&address).await;
            return Ok(Resolution::Connectivity {
                address,
                connected,
                discovery_requested: false,
            });
        }

        let discovery_requested = match self.registry.begin_discovery(&address, now).await {
            DiscoveryDecision::Request { attempt } => {
                self.request_name(&address, attempt).await?;
                true
            }
            DiscoveryDecision::Pending | DiscoveryDecision::Known(_) => false,
        };

        Ok(Resolution::Connectivity {
            address,
            connected,
            discovery_requested,
        })
    }

    async fn request_name(&self, address: &str, attempt: u32) -> Result<()> {
        let topic = discovery_topic(address);
        debug!("Requesting name of {} (attempt {})", address, attempt);
        if let Err(e) = self.transport.publish(&topic, &[]).await {
            warn!("Failed to request name of {}: {}", address, e);
            self.registry.request_failed(address).await;
            return Err(e);
        }
        Ok(())
    }
}

/// Whether a connectivity payload reports a connect.
fn is_connected_payload(payload: &[u8]) -> bool {
    let text = String::from_utf8_lossy(payload);
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "connected" | "online"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::registry::DeviceState;
    use thingy_types::uuids;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);

    fn temperature_topic(address: &str) -> String {
        format!("{}/{}/{}", address, uuids::ENVIRONMENT_SERVICE, uuids::TEMPERATURE)
    }

    fn name_topic(address: &str) -> String {
        format!("{}/{}/{}", address, uuids::CONFIGURATION_SERVICE, uuids::DEVICE_NAME)
    }

    fn resolver() -> (TopicResolver, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let resolver = TopicResolver::new(transport.clone(), DiscoveryPolicy::default());
        (resolver, transport)
    }

    #[tokio::test]
    async fn test_unknown_device_triggers_one_request() {
        let (resolver, transport) = resolver();
        let msg = InboundMessage::new(temperature_topic("dev1"), vec![20u8, 0]);

        let first = resolver.handle(&msg, T0).await.unwrap();
        assert_eq!(
            first,
            Resolution::DiscoveryRequested {
                address: "dev1".to_string(),
                attempt: 1
            }
        );
        let second = resolver.handle(&msg, T0).await.unwrap();
        assert_eq!(
            second,
            Resolution::AwaitingName {
                address: "dev1".to_string()
            }
        );

        let published = transport.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, discovery_topic("dev1"));
        assert!(published[0].payload.is_empty());
    }

    #[tokio::test]
    async fn test_name_completes_discovery() {
        let (resolver, _transport) = resolver();
        resolver
            .handle(&InboundMessage::new(temperature_topic("dev1"), vec![20u8, 0]), T0)
            .await
            .unwrap();

        let named = resolver
            .handle(&InboundMessage::new(name_topic("dev1"), "kitchen\0"), T0)
            .await
            .unwrap();
        assert_eq!(
            named,
            Resolution::Named {
                address: "dev1".to_string(),
                name: "kitchen".to_string(),
                assignment: NameAssignment::Assigned,
            }
        );

        let forwarded = resolver
            .handle(&InboundMessage::new(temperature_topic("dev1"), vec![21u8, 50]), T0)
            .await
            .unwrap();
        match forwarded {
            Resolution::Forward(decoded) => {
                assert_eq!(decoded.device, "kitchen");
                assert!(decoded.characteristic.is(CharacteristicName::Temperature));
                assert_eq!(&decoded.payload[..], &[21u8, 50]);
            }
            other => panic!("expected forward, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_of_unknown_device_requests_name() {
        let (resolver, transport) = resolver();
        let resolution = resolver
            .handle(&InboundMessage::new("dev1/connected", "1"), T0)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Connectivity {
                address: "dev1".to_string(),
                connected: true,
                discovery_requested: true,
            }
        );
        assert_eq!(transport.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_observational() {
        let (resolver, transport) = resolver();
        let resolution = resolver
            .handle(&InboundMessage::new("dev1/connected", "0"), T0)
            .await
            .unwrap();
        assert!(matches!(
            resolution,
            Resolution::Connectivity {
                connected: false,
                discovery_requested: false,
                ..
            }
        ));
        assert!(transport.published().await.is_empty());
        assert_eq!(resolver.registry().state("dev1").await, DeviceState::Unknown);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_name() {
        let (resolver, transport) = resolver();
        resolver
            .handle(&InboundMessage::new(name_topic("dev1"), "kitchen"), T0)
            .await
            .unwrap();
        resolver
            .handle(&InboundMessage::new("dev1/connected", "false"), T0)
            .await
            .unwrap();
        resolver
            .handle(&InboundMessage::new("dev1/connected", "true"), T0)
            .await
            .unwrap();
        assert!(transport.published().await.is_empty());
        assert_eq!(
            resolver.registry().name_of("dev1").await.as_deref(),
            Some("kitchen")
        );
    }

    #[tokio::test]
    async fn test_malformed_topics_are_dropped() {
        let (resolver, transport) = resolver();
        let service_only = format!("dev1/{}", uuids::ENVIRONMENT_SERVICE);
        for topic in ["dev1", "a/b/c/d", service_only.as_str()] {
            let resolution = resolver
                .handle(&InboundMessage::new(topic, vec![1u8]), T0)
                .await
                .unwrap();
            assert_eq!(resolution, Resolution::Malformed);
        }
        assert!(transport.published().await.is_empty());
        assert!(resolver.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_ids_pass_through() {
        let (resolver, _transport) = resolver();
        resolver
            .handle(&InboundMessage::new(name_topic("dev1"), "kitchen"), T0)
            .await
            .unwrap();
        let resolution = resolver
            .handle(&InboundMessage::new("dev1/abcd/ef01", vec![1u8]), T0)
            .await
            .unwrap();
        match resolution {
            Resolution::Forward(decoded) => {
                assert_eq!(decoded.service.to_string(), "abcd");
                assert_eq!(decoded.characteristic.to_string(), "ef01");
            }
            other => panic!("expected forward, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_request_allows_retry() {
        let (resolver, transport) = resolver();
        transport.set_transient_failures(1);
        let msg = InboundMessage::new(temperature_topic("dev1"), vec![20u8, 0]);

        assert!(resolver.handle(&msg, T0).await.is_err());
        assert_eq!(resolver.registry().state("dev1").await, DeviceState::Unknown);

        assert!(matches!(
            resolver.handle(&msg, T0).await.unwrap(),
            Resolution::DiscoveryRequested { attempt: 1, .. }
        ));
        assert_eq!(transport.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let (resolver, _transport) = resolver();
        let result = resolver
            .handle(&InboundMessage::new(name_topic("dev1"), "\0\0"), T0)
            .await;
        assert!(matches!(result, Err(crate::Error::Parse(_))));
        assert!(!resolver.registry().state("dev1").await.is_known());
    }

    #[test]
    fn test_connectivity_payloads() {
        assert!(is_connected_payload(b"1"));
        assert!(is_connected_payload(b" Connected\n"));
        assert!(is_connected_payload(b"online"));
        assert!(!is_connected_payload(b"0"));
        assert!(!is_connected_payload(b"false"));
        assert!(!is_connected_payload(b""));
    }

    #[test]
    fn test_inbound_address() {
        assert_eq!(InboundMessage::new("dev1/connected", "1").address(), "dev1");
    }
}
