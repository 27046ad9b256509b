//! Error types for payload parsing in thingy-types.

use thiserror::Error;

/// Errors that can occur when decoding a characteristic payload.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is shorter than the characteristic's layout.
    #[error("Insufficient bytes: {characteristic} requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        characteristic: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The payload has the right size but cannot be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using thingy-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
