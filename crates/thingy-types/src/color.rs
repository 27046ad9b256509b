//! Light sample conversion and door detection.
//!
//! The color sensor reports raw red, green, blue and clear channel counts.
//! A door sensor is built by placing the device inside a cupboard: when the
//! door opens, ambient light floods the sensor and the normalized grayscale
//! value rises above [`DOOR_OPEN_GRAYSCALE`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clear-channel reading that maps to black.
pub const CLEAR_AT_BLACK: f64 = 300.0;

/// Clear-channel reading that maps to full brightness.
pub const CLEAR_AT_WHITE: f64 = 400.0;

/// Grayscale value (0-255) above which the door is considered open.
pub const DOOR_OPEN_GRAYSCALE: u8 = 200;

/// Raw color sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColorSample {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub clear: u16,
}

/// Normalized 8-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Convert a raw sample to RGB.
///
/// Each channel's share of `red + green + blue` is scaled by a brightness
/// estimate derived from the clear channel and clamped to `[0, 255]`. A sample
/// with no color counts at all yields black.
pub fn to_rgb(sample: &ColorSample) -> Rgb {
    let sum = f64::from(sample.red) + f64::from(sample.green) + f64::from(sample.blue);
    let brightness =
        ((f64::from(sample.clear) - CLEAR_AT_BLACK) / (CLEAR_AT_WHITE - CLEAR_AT_BLACK)).max(0.0);

    let channel = |raw: u16| -> u8 {
        if sum == 0.0 {
            return 0;
        }
        let ratio = f64::from(raw) / sum;
        (ratio * 255.0 * 3.0 * brightness).min(255.0).round() as u8
    };

    Rgb {
        red: channel(sample.red),
        green: channel(sample.green),
        blue: channel(sample.blue),
    }
}

/// Average of the three channels, rounded.
pub fn grayscale(rgb: &Rgb) -> u8 {
    let total = u16::from(rgb.red) + u16::from(rgb.green) + u16::from(rgb.blue);
    (f64::from(total) / 3.0).round() as u8
}

/// Whether a color sample indicates an open door.
pub fn is_door_open(sample: &ColorSample) -> bool {
    grayscale(&to_rgb(sample)) > DOOR_OPEN_GRAYSCALE
}
