//! Service configuration.
//!
//! Every section is optional; a missing file yields the defaults below.
//!
//! ```toml
//! [mqtt]
//! broker = "mqtt://localhost:1883"
//! client_id = "thingy-service"
//! qos = 1
//!
//! [discovery]
//! retry_after_secs = 30
//! max_attempts = 3
//!
//! [engine]
//! workers = 4
//!
//! [preferences]
//! path = "/var/lib/thingy/preferences.json"
//! poll_interval_secs = 5
//!
//! [forward]
//! enabled = true
//! prefix = "metrics"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use thingy_core::{DiscoveryPolicy, RetryConfig, RouterConfig, SUBSCRIPTIONS};

use crate::mqtt::parse_broker_url;

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub discovery: DiscoveryConfig,
    pub engine: EngineConfig,
    pub preferences: PreferencesConfig,
    pub refresh: RefreshConfig,
    pub forward: ForwardConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration, collecting every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use thingy_service::Config;
    ///
    /// let config = Config::default();
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.mqtt.validate());
        errors.extend(self.discovery.validate());
        errors.extend(self.engine.validate());
        errors.extend(self.preferences.validate());
        errors.extend(self.refresh.validate());
        errors.extend(self.forward.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL (`mqtt://host:port` or `mqtts://host:port`).
    pub broker: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
    /// QoS for subscriptions and publishes (0, 1 or 2).
    pub qos: u8,
    /// Topic filters to subscribe to after every connect.
    pub subscriptions: Vec<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mqtt://localhost:1883".to_string(),
            client_id: "thingy-service".to_string(),
            username: None,
            password: None,
            keep_alive: 30,
            qos: 1,
            subscriptions: SUBSCRIPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MqttConfig {
    /// Validate broker settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = parse_broker_url(&self.broker) {
            errors.push(ValidationError::new(
                "mqtt.broker",
                format!("invalid broker URL '{}': {}", self.broker, e),
            ));
        }
        if self.client_id.is_empty() {
            errors.push(ValidationError::new(
                "mqtt.client_id",
                "client id cannot be empty",
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            errors.push(ValidationError::new(
                "mqtt.username",
                "username and password must be set together",
            ));
        }
        if self.keep_alive == 0 || self.keep_alive > u64::from(u16::MAX) {
            errors.push(ValidationError::new(
                "mqtt.keep_alive",
                format!("keep alive {} must be between 1 and 65535 seconds", self.keep_alive),
            ));
        }
        if self.qos > 2 {
            errors.push(ValidationError::new(
                "mqtt.qos",
                format!("qos {} is invalid (expected 0, 1 or 2)", self.qos),
            ));
        }
        if self.subscriptions.is_empty() {
            errors.push(ValidationError::new(
                "mqtt.subscriptions",
                "at least one topic filter is required",
            ));
        }
        for (i, filter) in self.subscriptions.iter().enumerate() {
            if filter.is_empty() {
                errors.push(ValidationError::new(
                    format!("mqtt.subscriptions[{}]", i),
                    "topic filter cannot be empty",
                ));
            }
        }

        errors
    }

    pub fn keep_alive_duration(&self) -> Duration {
        Duration::from_secs(self.keep_alive)
    }
}

/// Device name discovery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Re-send an unanswered name request after this many seconds.
    /// Omit to never re-send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Total name requests per device, counting the first.
    pub max_attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let policy = DiscoveryPolicy::default();
        Self {
            retry_after_secs: policy.retry_after.map(|d| d.as_secs()),
            max_attempts: policy.max_attempts,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.max_attempts == 0 {
            errors.push(ValidationError::new(
                "discovery.max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.retry_after_secs == Some(0) {
            errors.push(ValidationError::new(
                "discovery.retry_after_secs",
                "retry delay must be at least 1 second (omit to disable retries)",
            ));
        }

        errors
    }

    pub fn policy(&self) -> DiscoveryPolicy {
        match self.retry_after_secs {
            Some(secs) => DiscoveryPolicy::with_retry(Duration::from_secs(secs), self.max_attempts),
            None => DiscoveryPolicy {
                retry_after: None,
                max_attempts: self.max_attempts,
            },
        }
    }
}

/// Message pipeline sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of router workers.
    pub workers: usize,
    /// Capacity of each worker's queue.
    pub queue_capacity: usize,
    /// Metric events buffered per subscriber before the oldest are dropped.
    pub metric_buffer: usize,
}

/// Upper bound for `engine.workers`.
pub const MAX_WORKERS: usize = 256;

impl Default for EngineConfig {
    fn default() -> Self {
        let router = RouterConfig::default();
        Self {
            workers: router.workers,
            queue_capacity: router.queue_capacity,
            metric_buffer: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.workers == 0 || self.workers > MAX_WORKERS {
            errors.push(ValidationError::new(
                "engine.workers",
                format!("workers {} must be between 1 and {}", self.workers, MAX_WORKERS),
            ));
        }
        if self.queue_capacity == 0 {
            errors.push(ValidationError::new(
                "engine.queue_capacity",
                "queue capacity must be greater than 0",
            ));
        }
        if self.metric_buffer == 0 {
            errors.push(ValidationError::new(
                "engine.metric_buffer",
                "metric buffer must be greater than 0",
            ));
        }

        errors
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

/// Preference store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// JSON file holding an array of user records.
    pub path: PathBuf,
    /// How often to check the file for changes, in seconds.
    pub poll_interval_secs: u64,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_preferences_path(),
            poll_interval_secs: 5,
        }
    }
}

impl PreferencesConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "preferences.path",
                "preferences path cannot be empty",
            ));
        }
        if self.poll_interval_secs == 0 {
            errors.push(ValidationError::new(
                "preferences.poll_interval_secs",
                "poll interval must be at least 1 second",
            ));
        }

        errors
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Retry policy for threshold cache refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
        }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.initial_delay_ms == 0 {
            errors.push(ValidationError::new(
                "refresh.initial_delay_ms",
                "initial delay must be greater than 0",
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            errors.push(ValidationError::new(
                "refresh.max_delay_ms",
                format!(
                    "max delay {}ms is shorter than initial delay {}ms",
                    self.max_delay_ms, self.initial_delay_ms
                ),
            ));
        }

        errors
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

/// Re-publishing of metric events for downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub enabled: bool,
    /// Events go to `{prefix}/{device}/{measurement}/json`.
    pub prefix: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "thingy".to_string(),
        }
    }
}

impl ForwardConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.prefix.is_empty() {
            errors.push(ValidationError::new(
                "forward.prefix",
                "prefix cannot be empty",
            ));
        } else if self.prefix.contains(['#', '+']) {
            errors.push(ValidationError::new(
                "forward.prefix",
                format!("prefix '{}' cannot contain MQTT wildcards", self.prefix),
            ));
        } else if self.prefix.split('/').any(str::is_empty) {
            errors.push(ValidationError::new(
                "forward.prefix",
                format!("prefix '{}' has an empty topic level", self.prefix),
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `mqtt.broker` or `mqtt.subscriptions[0]`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thingy")
        .join("server.toml")
}

/// Default preference file path.
pub fn default_preferences_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thingy")
        .join("preferences.json")
}
