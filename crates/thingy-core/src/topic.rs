//! Topic layout on the bus.
//!
//! Inbound topics have two or three `/`-delimited segments:
//!
//! - `{address}/{service}` reports connectivity
//! - `{address}/{service}/{characteristic}` carries characteristic data
//!
//! Outbound requests append a `read` or `write` segment to a data topic.

use core::fmt;

use thingy_types::{CharacteristicId, CharacteristicName, IdTable, ServiceId, ServiceName};

/// Topic filters that match every inbound topic.
pub const SUBSCRIPTIONS: [&str; 2] = ["+/+", "+/+/+"];

/// Topic notifications are published to.
pub const NOTIFICATION_TOPIC: &str = "notification";

/// A decoded inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// `{address}/{service}`
    Connectivity { address: String, service: ServiceId },
    /// `{address}/{service}/{characteristic}`
    Data {
        address: String,
        service: ServiceId,
        characteristic: CharacteristicId,
    },
}

impl Topic {
    /// Decode an inbound topic.
    ///
    /// Returns `None` when the topic does not have two or three non-empty
    /// segments.
    pub fn parse(topic: &str) -> Option<Self> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        match segments.as_slice() {
            [address, service] => Some(Topic::Connectivity {
                address: (*address).to_string(),
                service: ServiceId::resolve(service),
            }),
            [address, service, characteristic] => Some(Topic::Data {
                address: (*address).to_string(),
                service: ServiceId::resolve(service),
                characteristic: CharacteristicId::resolve(characteristic),
            }),
            _ => None,
        }
    }

    /// The device address the topic belongs to.
    pub fn address(&self) -> &str {
        match self {
            Topic::Connectivity { address, .. } | Topic::Data { address, .. } => address,
        }
    }

    pub fn service(&self) -> &ServiceId {
        match self {
            Topic::Connectivity { service, .. } | Topic::Data { service, .. } => service,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Connectivity { address, service } => {
                write!(f, "{}/{}", address, service.wire_id())
            }
            Topic::Data {
                address,
                service,
                characteristic,
            } => write!(
                f,
                "{}/{}/{}",
                address,
                service.wire_id(),
                characteristic.wire_id()
            ),
        }
    }
}

/// Topic that asks a device to report one of its characteristics.
pub fn read_topic(address: &str, service: ServiceName, characteristic: CharacteristicName) -> String {
    format!("{}/{}/{}/read", address, service.id(), characteristic.id())
}

/// Topic that writes a value to one of a device's characteristics.
pub fn write_topic(address: &str, service: ServiceName, characteristic: CharacteristicName) -> String {
    format!("{}/{}/{}/write", address, service.id(), characteristic.id())
}

/// The discovery request topic: a read of the device name characteristic.
pub fn discovery_topic(address: &str) -> String {
    read_topic(
        address,
        ServiceName::Configuration,
        CharacteristicName::DeviceName,
    )
}
