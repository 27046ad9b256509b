//! Error types for thingy-core.
//!
//! # Where errors surface
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`Error::Parse`] | payload decoding | logged, message dropped |
//! | [`Error::Transport`] | publishing discovery requests or notifications | logged, that one publish dropped |
//! | [`Error::Store`] | [`ThresholdEngine::refresh_cache`](crate::ThresholdEngine::refresh_cache) | previous cache kept, retried with backoff |
//! | [`Error::Serialize`] | encoding a notification payload | logged, notification dropped |
//! | [`Error::ChannelClosed`] | routing a message after shutdown | stop feeding the router |
//! | [`Error::InvalidConfig`] | constructing components | fix configuration and restart |
//!
//! Nothing raised while handling an inbound message is fatal: the message
//! pipeline logs the error and continues with the next message.

use thiserror::Error;

use thingy_types::ParseError;

/// Errors produced by the telemetry core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A characteristic payload could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The pub/sub transport rejected an operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The preference store could not be read.
    #[error("Preference store error: {0}")]
    Store(String),

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A worker queue was closed.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a preference store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using thingy-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
