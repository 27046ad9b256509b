//! Telemetry core for Thingy environmental sensors on a pub/sub bus.
//!
//! This crate turns raw bus messages into named metric events and
//! debounced threshold notifications.
//!
//! # Features
//!
//! - **Topic resolution**: decode `device/service[/characteristic]` topics
//!   against the static identifier tables
//! - **Device discovery**: learn friendly names through a name-read
//!   handshake, with an explicit per-device state machine
//! - **Threshold alerts**: per-user min/max rules with debounce, and
//!   continuous open-duration tracking for the door metric
//! - **Cache refresh**: atomic snapshot replacement with retry and backoff
//! - **Per-device ordering**: a worker pool that keeps each device's
//!   messages in order while devices proceed concurrently
//!
//! # Data flow
//!
//! ```text
//! bus ─▶ MessageRouter ─▶ Pipeline ─┬─▶ TopicResolver ─▶ (name request) ─▶ bus
//!                                   ├─▶ EventDispatcher ─▶ metric subscribers
//!                                   └─▶ ThresholdEngine ─▶ notification ─▶ bus
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use thingy_core::{
//!     DiscoveryPolicy, EventDispatcher, InboundMessage, MockPreferenceStore, MockTransport,
//!     Pipeline, ThresholdEngine, TopicResolver,
//! };
//!
//! #[tokio::main]
//! async fn main() -> thingy_core::Result<()> {
//!     let transport = Arc::new(MockTransport::new());
//!     let store = Arc::new(MockPreferenceStore::new());
//!
//!     let engine = Arc::new(ThresholdEngine::new(store, transport.clone()));
//!     engine.refresh_cache().await?;
//!
//!     let resolver = TopicResolver::new(transport.clone(), DiscoveryPolicy::default());
//!     let pipeline = Pipeline::new(resolver, engine, EventDispatcher::default());
//!
//!     // An unknown device: the message is dropped and its name is requested
//!     let report = pipeline.handle(InboundMessage::new("dev1/connected", "1")).await?;
//!     assert!(!report.forwarded());
//!     assert_eq!(transport.published().await.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod events;
pub mod mock;
pub mod notification;
pub mod open_state;
pub mod pipeline;
pub mod refresh;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod router;
pub mod thresholds;
pub mod topic;
pub mod traits;

// Core exports
pub use engine::ThresholdEngine;
pub use error::{Error, Result};
pub use pipeline::{HandleReport, Pipeline};
pub use resolver::{DecodedMessage, InboundMessage, Resolution, TopicResolver};
pub use traits::{PreferenceStore, Transport};

pub use events::{EventDispatcher, EventReceiver, EventSender, MetricEvent};
pub use mock::{MockPreferenceStore, MockTransport, PublishedMessage};
pub use notification::Notification;
pub use open_state::{OpenState, OpenStateTracker};
pub use refresh::{CacheRefresher, RefreshHandle};
pub use registry::{DeviceRegistry, DeviceState, DiscoveryDecision, DiscoveryPolicy, NameAssignment};
pub use retry::{RetryConfig, with_retry};
pub use router::{MessageRouter, RouterConfig};
pub use thresholds::{ThresholdCache, ThresholdRule, UserThresholds, Violation, ViolationKind};
pub use topic::{NOTIFICATION_TOPIC, SUBSCRIPTIONS, Topic, discovery_topic, read_topic, write_topic};

// Re-export from thingy-types
pub use thingy_types::uuid as uuids;
pub use thingy_types::{FieldValue, MetricName, Reading};
