//! Seams to the external collaborators.
//!
//! The core talks to the pub/sub bus through [`Transport`] and reads user
//! preferences through [`PreferenceStore`]. Production adapters live in the
//! service crate; [`crate::mock`] provides in-memory versions for tests.

use async_trait::async_trait;

use thingy_types::UserPreferences;

use crate::error::Result;

/// Outbound side of the pub/sub bus.
///
/// Subscribing and receiving are owned by the transport adapter, which feeds
/// inbound messages into a [`MessageRouter`](crate::MessageRouter).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// The authoritative store of user alert preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// All users that have at least one threshold configured.
    ///
    /// Implementations may return users without thresholds; the engine
    /// filters them out.
    async fn list_users_with_thresholds(&self) -> Result<Vec<UserPreferences>>;
}
