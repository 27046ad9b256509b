//! Characteristic payload decoding.
//!
//! Every payload is little-endian. The layout is fixed by the
//! characteristic, so decoding is keyed on [`CharacteristicName`].

use bytes::Buf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::color::ColorSample;
use crate::error::{ParseError, ParseResult};
use crate::identifiers::{CharacteristicName, IdTable};

/// eCO2 and TVOC concentrations from the gas sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AirQuality {
    /// Equivalent CO2 in ppm.
    pub eco2: u16,
    /// Total volatile organic compounds in ppb.
    pub tvoc: u16,
}

/// A decoded telemetry payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Color(ColorSample),
    /// Relative humidity in percent.
    Humidity(u8),
    /// Temperature in °C.
    Temperature(f64),
    /// Pressure in hPa.
    Pressure(f64),
    AirQuality(AirQuality),
    /// Battery level in percent.
    BatteryLevel(u8),
    /// `true` while the button is held down.
    Button(bool),
}

impl Reading {
    /// Decode a payload for the given characteristic.
    ///
    /// Returns `Ok(None)` for characteristics that do not carry telemetry
    /// (device name, LED).
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if the payload is shorter
    /// than the characteristic's layout.
    pub fn decode(characteristic: CharacteristicName, data: &[u8]) -> ParseResult<Option<Self>> {
        let reading = match characteristic {
            CharacteristicName::Color => Reading::Color(decode_color(data)?),
            CharacteristicName::Humidity => Reading::Humidity(decode_u8(characteristic, data)?),
            CharacteristicName::Temperature => Reading::Temperature(decode_temperature(data)?),
            CharacteristicName::Pressure => Reading::Pressure(decode_pressure(data)?),
            CharacteristicName::AirQuality => Reading::AirQuality(decode_air_quality(data)?),
            CharacteristicName::BatteryLevel => {
                Reading::BatteryLevel(decode_u8(characteristic, data)?)
            }
            CharacteristicName::Button => Reading::Button(decode_u8(characteristic, data)? == 1),
            CharacteristicName::DeviceName | CharacteristicName::Led => return Ok(None),
        };
        Ok(Some(reading))
    }
}

fn ensure_len(characteristic: CharacteristicName, data: &[u8], expected: usize) -> ParseResult<()> {
    if data.len() < expected {
        return Err(ParseError::InsufficientBytes {
            characteristic: characteristic.as_str(),
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn decode_u8(characteristic: CharacteristicName, data: &[u8]) -> ParseResult<u8> {
    ensure_len(characteristic, data, 1)?;
    let mut buf = data;
    Ok(buf.get_u8())
}

/// Decode a color sample: red, green, blue, clear as `u16`.
pub fn decode_color(data: &[u8]) -> ParseResult<ColorSample> {
    ensure_len(CharacteristicName::Color, data, 8)?;
    let mut buf = data;
    Ok(ColorSample {
        red: buf.get_u16_le(),
        green: buf.get_u16_le(),
        blue: buf.get_u16_le(),
        clear: buf.get_u16_le(),
    })
}

/// Decode a temperature: signed integer part plus hundredths.
pub fn decode_temperature(data: &[u8]) -> ParseResult<f64> {
    ensure_len(CharacteristicName::Temperature, data, 2)?;
    let mut buf = data;
    let integer = buf.get_i8();
    let fraction = buf.get_u8();
    Ok(f64::from(integer) + f64::from(fraction) / 100.0)
}

/// Decode a pressure: signed 32-bit integer part plus hundredths.
pub fn decode_pressure(data: &[u8]) -> ParseResult<f64> {
    ensure_len(CharacteristicName::Pressure, data, 5)?;
    let mut buf = data;
    let integer = buf.get_i32_le();
    let fraction = buf.get_u8();
    Ok(f64::from(integer) + f64::from(fraction) / 100.0)
}

/// Decode the gas sensor payload.
pub fn decode_air_quality(data: &[u8]) -> ParseResult<AirQuality> {
    ensure_len(CharacteristicName::AirQuality, data, 4)?;
    let mut buf = data;
    Ok(AirQuality {
        eco2: buf.get_u16_le(),
        tvoc: buf.get_u16_le(),
    })
}

/// Decode a device name payload.
///
/// Trailing NUL padding and surrounding whitespace are removed.
pub fn decode_name(data: &[u8]) -> ParseResult<String> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ParseError::InvalidData(format!("device name is not UTF-8: {}", e)))?;
    let name = text.trim_matches(char::from(0)).trim();
    if name.is_empty() {
        return Err(ParseError::InvalidData("device name is empty".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_temperature_negative() {
        // -5 + 50/100 = -4.50
        let value = decode_temperature(&[0xFB, 50]).unwrap();
        assert!((value - (-4.5)).abs() < 1e-9);
    }

    #[test]
    fn test_decode_temperature_positive() {
        let value = decode_temperature(&[22, 75]).unwrap();
        assert!((value - 22.75).abs() < 1e-9);
    }

    #[test]
    fn test_decode_color() {
        let data = [0x10, 0x00, 0x20, 0x00, 0x30, 0x00, 0x90, 0x01];
        let sample = decode_color(&data).unwrap();
        assert_eq!(
            sample,
            ColorSample {
                red: 16,
                green: 32,
                blue: 48,
                clear: 400,
            }
        );
    }

    #[test]
    fn test_decode_air_quality() {
        let data = [0x90, 0x01, 0x0A, 0x00];
        let aq = decode_air_quality(&data).unwrap();
        assert_eq!(aq.eco2, 400);
        assert_eq!(aq.tvoc, 10);
    }

    #[test]
    fn test_decode_pressure() {
        // 1013 hPa + 25/100
        let data = [0xF5, 0x03, 0x00, 0x00, 25];
        let value = decode_pressure(&data).unwrap();
        assert!((value - 1013.25).abs() < 1e-9);
    }

    #[test]
    fn test_decode_by_characteristic() {
        assert_eq!(
            Reading::decode(CharacteristicName::Humidity, &[45]).unwrap(),
            Some(Reading::Humidity(45))
        );
        assert_eq!(
            Reading::decode(CharacteristicName::BatteryLevel, &[87]).unwrap(),
            Some(Reading::BatteryLevel(87))
        );
        assert_eq!(
            Reading::decode(CharacteristicName::Button, &[1]).unwrap(),
            Some(Reading::Button(true))
        );
        assert_eq!(
            Reading::decode(CharacteristicName::Button, &[0]).unwrap(),
            Some(Reading::Button(false))
        );
    }

    #[test]
    fn test_non_telemetry_characteristics() {
        assert_eq!(
            Reading::decode(CharacteristicName::DeviceName, b"Thingy").unwrap(),
            None
        );
        assert_eq!(Reading::decode(CharacteristicName::Led, &[0]).unwrap(), None);
    }

    #[test]
    fn test_insufficient_bytes() {
        let err = Reading::decode(CharacteristicName::Color, &[0; 6]).unwrap_err();
        assert_eq!(
            err,
            ParseError::InsufficientBytes {
                characteristic: "light_intensity",
                expected: 8,
                actual: 6,
            }
        );
        assert!(err.to_string().contains("requires 8 bytes"));

        assert!(Reading::decode(CharacteristicName::Humidity, &[]).is_err());
        assert!(Reading::decode(CharacteristicName::Temperature, &[1]).is_err());
    }

    #[test]
    fn test_extra_bytes_are_ignored() {
        assert_eq!(
            Reading::decode(CharacteristicName::Humidity, &[45, 0xFF, 0xFF]).unwrap(),
            Some(Reading::Humidity(45))
        );
    }

    #[test]
    fn test_decode_name() {
        assert_eq!(decode_name(b"Kitchen\0\0").unwrap(), "Kitchen");
        assert_eq!(decode_name(b"  door 1 ").unwrap(), "door 1");
        assert!(decode_name(b"\0\0").is_err());
        assert!(decode_name(&[0xFF, 0xFE]).is_err());
    }
}
