//! Device registry and discovery state.
//!
//! Every device address moves through three states:
//!
//! ```text
//! Unknown ──(message arrives)──▶ NameRequested ──(name arrives)──▶ Known
//! ```
//!
//! `Known` is terminal. Names are assigned once and never revised, and
//! entries are never removed, so a reconnecting device keeps its name.
//!
//! The registry is owned by a [`TopicResolver`](crate::TopicResolver); state
//! changes happen under a single write lock so that concurrent messages for
//! the same address issue at most one discovery request.

use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Discovery state of one device address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// Seen on the bus, no name yet.
    Unknown,
    /// A name read has been requested and no answer has arrived.
    NameRequested {
        /// When the most recent request was issued.
        since: OffsetDateTime,
        /// Number of requests issued so far.
        attempts: u32,
    },
    /// The device's friendly name is known.
    Known { name: String },
}

impl DeviceState {
    pub fn name(&self) -> Option<&str> {
        match self {
            DeviceState::Known { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, DeviceState::Known { .. })
    }
}

/// How to treat a device that never answers its name request.
///
/// The default issues a single request and waits forever: every later
/// message from that device is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    /// Re-issue the request when a message arrives this long after the
    /// previous request. `None` disables retries.
    pub retry_after: Option<Duration>,
    /// Upper bound on the total number of requests per device.
    pub max_attempts: u32,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            retry_after: None,
            max_attempts: 1,
        }
    }
}

impl DiscoveryPolicy {
    /// Retry every `retry_after`, issuing at most `max_attempts` requests.
    pub fn with_retry(retry_after: Duration, max_attempts: u32) -> Self {
        Self {
            retry_after: Some(retry_after),
            max_attempts,
        }
    }

    fn should_retry(&self, since: OffsetDateTime, attempts: u32, now: OffsetDateTime) -> bool {
        match self.retry_after {
            Some(retry_after) => attempts < self.max_attempts && now - since >= retry_after,
            None => false,
        }
    }
}

/// What the caller must do after [`DeviceRegistry::begin_discovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryDecision {
    /// Publish a name request. `attempt` starts at 1.
    Request { attempt: u32 },
    /// A request is outstanding; drop the message.
    Pending,
    /// The device already has a name.
    Known(String),
}

/// Result of recording a device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameAssignment {
    /// The name was recorded.
    Assigned,
    /// The name was recorded, but another address already claimed it. The
    /// inverse lookup keeps pointing at `first_address`.
    Duplicate { first_address: String },
    /// The address already had a name; it is kept.
    AlreadyKnown { name: String },
}

#[derive(Debug, Default)]
struct RegistryInner {
    devices: HashMap<String, DeviceState>,
    by_name: HashMap<String, String>,
}

/// Mapping of device addresses to friendly names, with its inverse.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
    policy: DiscoveryPolicy,
}

impl DeviceRegistry {
    pub fn new(policy: DiscoveryPolicy) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            policy,
        }
    }

    pub fn policy(&self) -> &DiscoveryPolicy {
        &self.policy
    }

    /// Current state of `address`. Addresses never seen are `Unknown`.
    pub async fn state(&self, address: &str) -> DeviceState {
        self.inner
            .read()
            .await
            .devices
            .get(address)
            .cloned()
            .unwrap_or(DeviceState::Unknown)
    }

    pub async fn name_of(&self, address: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .devices
            .get(address)
            .and_then(|s| s.name().map(str::to_string))
    }

    /// The address that first claimed `name`.
    pub async fn address_of(&self, name: &str) -> Option<String> {
        self.inner.read().await.by_name.get(name).cloned()
    }

    /// Record that `address` was seen, without changing its state.
    pub async fn observe(&self, address: &str) {
        let mut inner = self.inner.write().await;
        inner
            .devices
            .entry(address.to_string())
            .or_insert(DeviceState::Unknown);
    }

    /// Decide whether a name request should be issued for `address`.
    ///
    /// Moves `Unknown` to `NameRequested` and returns
    /// [`DiscoveryDecision::Request`]. The check and the transition happen
    /// under one write lock.
    pub async fn begin_discovery(&self, address: &str, now: OffsetDateTime) -> DiscoveryDecision {
        let mut inner = self.inner.write().await;
        let state = inner
            .devices
            .entry(address.to_string())
            .or_insert(DeviceState::Unknown);

        match state {
            DeviceState::Known { name } => DiscoveryDecision::Known(name.clone()),
            DeviceState::Unknown => {
                *state = DeviceState::NameRequested {
                    since: now,
                    attempts: 1,
                };
                DiscoveryDecision::Request { attempt: 1 }
            }
            DeviceState::NameRequested { since, attempts } => {
                if self.policy.should_retry(*since, *attempts, now) {
                    *since = now;
                    *attempts += 1;
                    DiscoveryDecision::Request { attempt: *attempts }
                } else {
                    DiscoveryDecision::Pending
                }
            }
        }
    }

    /// Undo the last request for `address` after it could not be published.
    pub async fn request_failed(&self, address: &str) {
        let mut inner = self.inner.write().await;
        if let Some(state) = inner.devices.get_mut(address) {
            match state {
                DeviceState::NameRequested { attempts, .. } if *attempts > 1 => *attempts -= 1,
                DeviceState::NameRequested { .. } => *state = DeviceState::Unknown,
                DeviceState::Unknown | DeviceState::Known { .. } => {}
            }
        }
    }

    /// Record the friendly name reported by `address`.
    pub async fn record_name(&self, address: &str, name: &str) -> NameAssignment {
        let mut inner = self.inner.write().await;

        if let Some(DeviceState::Known { name: existing }) = inner.devices.get(address) {
            if existing != name {
                warn!(
                    "Device {} reported name '{}' but is already known as '{}'; keeping the original",
                    address, name, existing
                );
            }
            return NameAssignment::AlreadyKnown {
                name: existing.clone(),
            };
        }

        inner.devices.insert(
            address.to_string(),
            DeviceState::Known {
                name: name.to_string(),
            },
        );

        match inner.by_name.get(name) {
            Some(first) if first != address => {
                warn!(
                    "Device name '{}' reported by {} is already used by {}",
                    name, address, first
                );
                NameAssignment::Duplicate {
                    first_address: first.clone(),
                }
            }
            _ => {
                inner.by_name.insert(name.to_string(), address.to_string());
                debug!("Registered device {} as '{}'", address, name);
                NameAssignment::Assigned
            }
        }
    }

    /// Number of addresses seen.
    pub async fn len(&self) -> usize {
        self.inner.read().await.devices.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.devices.is_empty()
    }

    /// `(address, name)` for every known device, sorted by address.
    pub async fn known_devices(&self) -> Vec<(String, String)> {
        let inner = self.inner.read().await;
        let mut devices: Vec<(String, String)> = inner
            .devices
            .iter()
            .filter_map(|(addr, state)| state.name().map(|n| (addr.clone(), n.to_string())))
            .collect();
        devices.sort();
        devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);

    #[tokio::test]
    async fn test_unseen_address_is_unknown() {
        let registry = DeviceRegistry::default();
        assert_eq!(registry.state("dev1").await, DeviceState::Unknown);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_discovery_requested_once() {
        let registry = DeviceRegistry::default();
        assert_eq!(
            registry.begin_discovery("dev1", T0).await,
            DiscoveryDecision::Request { attempt: 1 }
        );
        assert_eq!(
            registry.begin_discovery("dev1", T0 + time::Duration::hours(1)).await,
            DiscoveryDecision::Pending
        );
        assert_eq!(
            registry.state("dev1").await,
            DeviceState::NameRequested {
                since: T0,
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_name_transitions_to_known() {
        let registry = DeviceRegistry::default();
        registry.begin_discovery("dev1", T0).await;
        assert_eq!(
            registry.record_name("dev1", "kitchen").await,
            NameAssignment::Assigned
        );
        assert_eq!(registry.name_of("dev1").await.as_deref(), Some("kitchen"));
        assert_eq!(registry.address_of("kitchen").await.as_deref(), Some("dev1"));
        assert_eq!(
            registry.begin_discovery("dev1", T0).await,
            DiscoveryDecision::Known("kitchen".to_string())
        );
    }

    #[tokio::test]
    async fn test_names_are_never_revised() {
        let registry = DeviceRegistry::default();
        registry.record_name("dev1", "kitchen").await;
        assert_eq!(
            registry.record_name("dev1", "garage").await,
            NameAssignment::AlreadyKnown {
                name: "kitchen".to_string()
            }
        );
        assert_eq!(registry.name_of("dev1").await.as_deref(), Some("kitchen"));
        assert_eq!(registry.address_of("garage").await, None);
    }

    #[tokio::test]
    async fn test_duplicate_name_keeps_first_address() {
        let registry = DeviceRegistry::default();
        registry.record_name("dev1", "kitchen").await;
        assert_eq!(
            registry.record_name("dev2", "kitchen").await,
            NameAssignment::Duplicate {
                first_address: "dev1".to_string()
            }
        );
        assert_eq!(registry.name_of("dev2").await.as_deref(), Some("kitchen"));
        assert_eq!(registry.address_of("kitchen").await.as_deref(), Some("dev1"));
    }

    #[tokio::test]
    async fn test_retry_policy() {
        let registry =
            DeviceRegistry::new(DiscoveryPolicy::with_retry(Duration::from_secs(30), 2));

        registry.begin_discovery("dev1", T0).await;
        assert_eq!(
            registry
                .begin_discovery("dev1", T0 + time::Duration::seconds(10))
                .await,
            DiscoveryDecision::Pending
        );
        assert_eq!(
            registry
                .begin_discovery("dev1", T0 + time::Duration::seconds(30))
                .await,
            DiscoveryDecision::Request { attempt: 2 }
        );
        // max_attempts reached
        assert_eq!(
            registry
                .begin_discovery("dev1", T0 + time::Duration::hours(1))
                .await,
            DiscoveryDecision::Pending
        );
    }

    #[tokio::test]
    async fn test_observe_does_not_change_state() {
        let registry = DeviceRegistry::default();
        registry.record_name("dev1", "kitchen").await;
        registry.observe("dev1").await;
        registry.observe("dev2").await;
        assert!(registry.state("dev1").await.is_known());
        assert_eq!(registry.state("dev2").await, DeviceState::Unknown);
        assert_eq!(registry.len().await, 2);
        assert_eq!(
            registry.known_devices().await,
            vec![("dev1".to_string(), "kitchen".to_string())]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_discovery_issues_one_request() {
        let registry = Arc::new(DeviceRegistry::default());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.begin_discovery("dev1", T0).await })
            })
            .collect();

        let mut requests = 0;
        for handle in handles {
            if let DiscoveryDecision::Request { .. } = handle.await.unwrap() {
                requests += 1;
            }
        }
        assert_eq!(requests, 1);
    }
}
