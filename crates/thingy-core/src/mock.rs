//! In-memory collaborators for testing.
//!
//! [`MockTransport`] records every publish and [`MockPreferenceStore`] serves
//! a configurable list of users. Both support failure injection:
//!
//! - **Permanent failure**: every call fails until cleared
//! - **Transient failure**: the next `n` calls fail, then calls succeed
//! - **Latency simulation** (store only): delay each fetch

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use thingy_types::UserPreferences;

use crate::error::{Error, Result};
use crate::traits::{PreferenceStore, Transport};

/// A message captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// The payload as UTF-8 text (lossy).
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// A transport that records publishes instead of sending them.
///
/// # Example
///
/// ```
/// use thingy_core::{MockTransport, Transport};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::new();
///     transport.publish("notification", b"{}").await.unwrap();
///     assert_eq!(transport.published_on("notification").await.len(), 1);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    published: RwLock<Vec<PublishedMessage>>,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` publishes.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Every successful publish, in order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }

    /// Successful publishes on `topic`.
    pub async fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::transport(format!("mock publish to {} failed", topic)));
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::transport(format!("mock publish to {} failed", topic)));
        }
        self.published.write().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

/// A preference store backed by a list in memory.
#[derive(Debug, Default)]
pub struct MockPreferenceStore {
    users: RwLock<Vec<UserPreferences>>,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
    fetch_count: AtomicU32,
    /// Simulated fetch latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl MockPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<UserPreferences>) -> Self {
        Self {
            users: RwLock::new(users),
            ..Default::default()
        }
    }

    /// Replace the stored users.
    pub async fn set_users(&self, users: Vec<UserPreferences>) {
        *self.users.write().await = users;
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` fetches.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of fetch attempts, including failed ones.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PreferenceStore for MockPreferenceStore {
    async fn list_users_with_thresholds(&self) -> Result<Vec<UserPreferences>> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::store("mock store unavailable"));
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::store("mock store unavailable"));
        }

        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| u.has_thresholds())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_records_publishes() {
        let transport = MockTransport::new();
        transport.publish("a/b", b"1").await.unwrap();
        transport.publish("notification", b"hi").await.unwrap();

        let all = transport.published().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].topic, "a/b");

        let notes = transport.published_on("notification").await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].payload_str(), "hi");
    }

    #[tokio::test]
    async fn test_transport_transient_failures() {
        let transport = MockTransport::new();
        transport.set_transient_failures(1);
        assert!(transport.publish("t", b"").await.is_err());
        assert!(transport.publish("t", b"").await.is_ok());
        assert_eq!(transport.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_store_filters_users_without_thresholds() {
        let store = MockPreferenceStore::with_users(vec![
            UserPreferences {
                name: "bob".to_string(),
                ..Default::default()
            },
            serde_json::from_str(r#"{"name":"alice","thresholds":{"humidity":{"max":60}}}"#)
                .unwrap(),
        ]);
        let users = store.list_users_with_thresholds().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "alice");
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_store_failure() {
        let store = MockPreferenceStore::new();
        store.set_should_fail(true);
        assert!(matches!(
            store.list_users_with_thresholds().await,
            Err(Error::Store(_))
        ));
        store.set_should_fail(false);
        assert!(store.list_users_with_thresholds().await.is_ok());
    }
}
