//! MQTT bridge for Thingy environmental sensors.
//!
//! This crate provides a service that:
//! - Subscribes to every device topic on the broker
//! - Learns device names through the name-read handshake
//! - Checks readings against each user's thresholds and publishes
//!   notifications on the `notification` topic
//! - Optionally re-publishes decoded metrics as JSON
//! - Reloads thresholds when the preference file changes
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/thingy/server.toml`;
//! see [`config`] for every section.
//!
//! ```toml
//! [mqtt]
//! broker = "mqtts://broker.example.com"
//! username = "bridge"
//! password = "secret"
//!
//! [preferences]
//! path = "/var/lib/thingy/preferences.json"
//! ```

pub mod app;
pub mod config;
pub mod forward;
pub mod mqtt;
pub mod store;

pub use app::{Service, run};
pub use config::{
    Config, ConfigError, DiscoveryConfig, EngineConfig, ForwardConfig, MqttConfig,
    PreferencesConfig, RefreshConfig, ValidationError,
};
pub use forward::MetricForwarder;
pub use mqtt::MqttTransport;
pub use store::{JsonFilePreferenceStore, PreferenceWatcher};
