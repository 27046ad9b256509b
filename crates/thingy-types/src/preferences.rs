//! Records exchanged with the user preference store.
//!
//! A user's preferences look like this, with every property optional:
//!
//! ```json
//! {
//!   "name": "alice",
//!   "contactData": { "telegram": 123456789, "email": "alice@example.com" },
//!   "thresholds": {
//!     "temperature": { "max": 50, "min": 5, "timeoutSeconds": 300 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default debounce window for a threshold, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Where to deliver a user's notifications.
///
/// The record is opaque: every field is kept as received and copied into
/// the notification payload, whatever its name or type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactInfo(Map<String, Value>);

impl ContactInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one contact field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ContactInfo {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A user's configured bound for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdSetting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
}

impl Default for ThresholdSetting {
    fn default() -> Self {
        Self {
            max: None,
            min: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// A user as returned by the preference store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub name: String,
    #[serde(default)]
    pub contact_data: ContactInfo,
    /// Thresholds keyed by metric name.
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdSetting>,
}

impl UserPreferences {
    /// Whether the user has at least one threshold configured.
    pub fn has_thresholds(&self) -> bool {
        !self.thresholds.is_empty()
    }
}
