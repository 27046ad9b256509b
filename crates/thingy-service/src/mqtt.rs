//! MQTT adapter for the message pipeline.
//!
//! [`MqttTransport`] implements the core [`Transport`] trait on top of a
//! rumqttc client, and [`run_event_loop`] feeds every inbound publish to a
//! [`MessageRouter`].
//!
//! # Reconnection
//!
//! rumqttc reconnects on the next poll after a connection error. The event
//! loop logs the error, waits a few seconds and polls again. Subscriptions
//! are re-issued after every `CONNACK` since sessions are not persisted.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use thingy_core::{Error, InboundMessage, MessageRouter, Result, Transport};

use crate::config::MqttConfig;

/// Outgoing request queue size for the rumqttc client.
pub const REQUEST_CAPACITY: usize = 1024;

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long to keep flushing queued publishes on shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes on the bus through a rumqttc client.
///
/// Publishes are queued on the client without waiting; the event loop sends
/// them. A full queue is reported as a transport error.
#[derive(Debug, Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    qos: QoS,
}

impl MqttTransport {
    pub fn new(client: AsyncClient, qos: QoS) -> Self {
        Self { client, qos }
    }

    pub fn client(&self) -> &AsyncClient {
        &self.client
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .try_publish(topic, self.qos, false, payload.to_vec())
            .map_err(|e| Error::transport(format!("publish to '{}' failed: {}", topic, e)))
    }
}

/// Create a client and its event loop for `config`.
///
/// Nothing is sent until the event loop is polled.
pub fn connect(config: &MqttConfig) -> std::result::Result<(AsyncClient, EventLoop), String> {
    let options = mqtt_options(config)?;
    Ok(AsyncClient::new(options, REQUEST_CAPACITY))
}

/// Build client options from `config`.
pub fn mqtt_options(config: &MqttConfig) -> std::result::Result<MqttOptions, String> {
    let (host, port, use_tls) = parse_broker_url(&config.broker)?;

    let mut options = MqttOptions::new(&config.client_id, host, port);
    options.set_keep_alive(config.keep_alive_duration());
    options.set_clean_session(true);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    if use_tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }

    Ok(options)
}

/// Map a configured QoS level to the protocol value.
pub fn qos_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Poll `eventloop` and route inbound publishes until `cancel` fires.
///
/// Returns the router and the event loop so the caller can drain the
/// router and then flush outstanding publishes with [`disconnect`].
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Vec<String>,
    qos: QoS,
    router: MessageRouter,
    cancel: CancellationToken,
) -> (MessageRouter, EventLoop) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("MQTT connected: {:?}", ack.code);
                    subscribe_all(&client, &subscriptions, qos);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage::new(publish.topic.to_string(), publish.payload);
                    if let Err(e) = router.route(message).await {
                        warn!("Router stopped, leaving MQTT event loop: {}", e);
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!("MQTT subscription acknowledged: {:?}", ack.return_codes);
                }
                Ok(Event::Incoming(Packet::PingResp)) => {
                    debug!("MQTT ping response received");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {}. Reconnecting...", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }

    info!("MQTT event loop stopped");
    (router, eventloop)
}

fn subscribe_all(client: &AsyncClient, subscriptions: &[String], qos: QoS) {
    for filter in subscriptions {
        match client.try_subscribe(filter, qos) {
            Ok(()) => info!("Subscribing to '{}'", filter),
            Err(e) => warn!("Failed to subscribe to '{}': {}", filter, e),
        }
    }
}

/// Send a `DISCONNECT` after everything already queued, and poll until it
/// goes out or [`FLUSH_TIMEOUT`] passes.
pub async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) -> Result<()> {
    client
        .try_disconnect()
        .map_err(|e| Error::transport(format!("disconnect failed: {}", e)))?;

    let flushed = tokio::time::timeout(FLUSH_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(Error::transport(e.to_string())),
            }
        }
    })
    .await;

    match flushed {
        Ok(result) => result,
        Err(_) => Err(Error::transport("timed out flushing MQTT publishes")),
    }
}

/// Connect, publish one message, and disconnect.
pub async fn publish_once(config: &MqttConfig, topic: &str, payload: Vec<u8>) -> Result<()> {
    let (client, mut eventloop) = connect(config).map_err(Error::invalid_config)?;
    client
        .try_publish(topic, qos_level(config.qos), false, payload)
        .map_err(|e| Error::transport(e.to_string()))?;
    disconnect(&client, &mut eventloop).await
}

/// Parse an MQTT broker URL into (host, port, use_tls).
pub fn parse_broker_url(url: &str) -> std::result::Result<(String, u16, bool), String> {
    let (scheme, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        ("mqtt", stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        ("mqtts", stripped)
    } else {
        return Err("Invalid scheme: URL must start with mqtt:// or mqtts://".to_string());
    };

    let use_tls = scheme == "mqtts";
    let default_port = if use_tls { 8883 } else { 1883 };

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: {}", p))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    Ok((host, port, use_tls))
}

/// Sanitize a device name for use as one topic level.
///
/// Wildcards, separators and spaces become `_`.
pub fn sanitize_topic_segment(s: &str) -> String {
    s.replace(['#', '+', ' ', '/'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url_mqtt() {
        let (host, port, tls) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
        assert!(!tls);
    }

    #[test]
    fn test_parse_broker_url_mqtts() {
        let (host, port, tls) = parse_broker_url("mqtts://broker.example.com:8884").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 8884);
        assert!(tls);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        assert_eq!(
            parse_broker_url("mqtt://localhost").unwrap(),
            ("localhost".to_string(), 1883, false)
        );
        assert_eq!(
            parse_broker_url("mqtts://secure.example.com").unwrap(),
            ("secure.example.com".to_string(), 8883, true)
        );
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(parse_broker_url("http://localhost:1883").is_err());
        assert!(parse_broker_url("localhost:1883").is_err());
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("mqtt://localhost:port").is_err());
    }

    #[test]
    fn test_sanitize_topic_segment() {
        assert_eq!(sanitize_topic_segment("living room"), "living_room");
        assert_eq!(sanitize_topic_segment("sensor#1"), "sensor_1");
        assert_eq!(sanitize_topic_segment("a+b/c"), "a_b_c");
        assert_eq!(sanitize_topic_segment("kitchen-thingy"), "kitchen-thingy");
    }

    #[test]
    fn test_qos_level() {
        assert_eq!(qos_level(0), QoS::AtMostOnce);
        assert_eq!(qos_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_level(2), QoS::ExactlyOnce);
    }

    #[test]
    fn test_mqtt_options() {
        let config = MqttConfig {
            broker: "mqtt://10.0.0.5:1884".to_string(),
            client_id: "bridge-1".to_string(),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            keep_alive: 45,
            ..MqttConfig::default()
        };
        let options = mqtt_options(&config).unwrap();
        assert_eq!(options.broker_address(), ("10.0.0.5".to_string(), 1884));
        assert_eq!(options.client_id(), "bridge-1");
        assert_eq!(options.keep_alive(), Duration::from_secs(45));
    }

    #[test]
    fn test_mqtt_options_rejects_bad_url() {
        let config = MqttConfig {
            broker: "tcp://localhost".to_string(),
            ..MqttConfig::default()
        };
        assert!(mqtt_options(&config).is_err());
    }

    #[tokio::test]
    async fn test_transport_queues_publish() {
        let (client, _eventloop) = connect(&MqttConfig::default()).unwrap();
        let transport = MqttTransport::new(client, QoS::AtLeastOnce);
        // Queued on the client; nothing is sent until the loop is polled
        transport.publish("dev1/connected", b"").await.unwrap();
    }
}
