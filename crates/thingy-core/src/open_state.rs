//! Continuous open-duration tracking for binary sensors.
//!
//! The door metric is reported as a flag, but thresholds on it are
//! expressed in seconds: the value compared is how long the door has been
//! open without interruption.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use time::OffsetDateTime;

/// Result of feeding one flag into the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenState {
    /// The flag is false; any open period has ended.
    Closed,
    /// The flag just became true; there is no duration yet.
    Opened,
    /// The flag has been true since the first report, this many seconds ago.
    OpenFor(f64),
}

/// Start time of the current open period, per device address.
#[derive(Debug, Default)]
pub struct OpenStateTracker {
    open_since: Mutex<HashMap<String, OffsetDateTime>>,
}

impl OpenStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the device at `address` reported `open` at `now`.
    ///
    /// Durations are reported in whole seconds.
    pub fn update(&self, address: &str, open: bool, now: OffsetDateTime) -> OpenState {
        let mut open_since = self
            .open_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !open {
            open_since.remove(address);
            return OpenState::Closed;
        }

        match open_since.get(address) {
            Some(start) => OpenState::OpenFor((now - *start).whole_seconds() as f64),
            None => {
                open_since.insert(address.to_string(), now);
                OpenState::Opened
            }
        }
    }

    /// When the current open period of the device at `address` started.
    pub fn open_since(&self, address: &str) -> Option<OffsetDateTime> {
        self.open_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
    }

    /// Number of devices currently open.
    pub fn open_count(&self) -> usize {
        self.open_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
