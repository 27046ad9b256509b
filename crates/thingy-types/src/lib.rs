//! Identifier tables and payload formats for Thingy environmental sensors.
//!
//! This crate has no async or I/O code. It provides:
//!
//! - UUID constants for the Thingy GATT services and characteristics
//! - Bidirectional id ↔ name tables with pass-through for unknown ids
//! - Fixed little-endian payload decoding per characteristic
//! - Light sample → RGB → grayscale conversion and door detection
//! - Metric names and the unit table used in notifications
//! - LED control payloads
//! - Preference store records (with the `serde` feature)
//!
//! # Example
//!
//! ```
//! use thingy_types::{CharacteristicName, Reading};
//!
//! let reading = Reading::decode(CharacteristicName::Temperature, &[0xFB, 50]).unwrap();
//! assert_eq!(reading, Some(Reading::Temperature(-4.5)));
//! ```

pub mod color;
pub mod error;
pub mod identifiers;
pub mod led;
pub mod metrics;
#[cfg(feature = "serde")]
pub mod preferences;
pub mod readings;
pub mod uuid;

pub use color::{ColorSample, Rgb, grayscale, is_door_open, to_rgb};
pub use error::{ParseError, ParseResult};
pub use identifiers::{
    CharacteristicId, CharacteristicName, IdTable, Identifier, ServiceId, ServiceName,
};
pub use led::{LedColor, LedCommand};
pub use metrics::{FieldValue, Measurement, MetricName};
#[cfg(feature = "serde")]
pub use preferences::{ContactInfo, ThresholdSetting, UserPreferences};
pub use readings::{AirQuality, Reading};
pub use uuid as uuids;
