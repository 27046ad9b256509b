//! Outbound threshold notifications.

use serde::Serialize;

use thingy_types::{ContactInfo, MetricName};

use crate::error::Result;
use crate::thresholds::Violation;

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub user: String,
    pub contact: ContactInfo,
    pub metric: MetricName,
    pub device: String,
    /// The value that was compared (seconds open for the door metric).
    pub value: f64,
    pub violation: Violation,
}

#[derive(Serialize)]
struct Payload<'a> {
    contact: &'a ContactInfo,
    msg: String,
}

impl Notification {
    /// Human-readable message text.
    pub fn message(&self) -> String {
        let unit = self.metric.unit();
        format!(
            "Attention {}: Threshold for metric '{}' was {}!\n{}: {}{}. Threshold: {}{}",
            self.user,
            self.metric,
            self.violation.kind.as_str(),
            self.device,
            self.value,
            unit,
            self.violation.limit,
            unit
        )
    }

    /// JSON payload published on the notification topic:
    /// `{"contact": {...}, "msg": "..."}`.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let payload = Payload {
            contact: &self.contact,
            msg: self.message(),
        };
        Ok(serde_json::to_vec(&payload)?)
    }
}
