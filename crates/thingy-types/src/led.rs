//! LED characteristic payloads.
//!
//! Writing one of these payloads to the LED characteristic changes the
//! device's LED mode.

use core::fmt;
use core::str::FromStr;

use bytes::BufMut;

/// Predefined colors for the breathe and one-shot modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LedColor {
    Red = 0x01,
    Green = 0x02,
    Yellow = 0x03,
    Blue = 0x04,
    Purple = 0x05,
    Cyan = 0x06,
    White = 0x07,
}

impl FromStr for LedColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(LedColor::Red),
            "green" => Ok(LedColor::Green),
            "yellow" => Ok(LedColor::Yellow),
            "blue" => Ok(LedColor::Blue),
            "purple" => Ok(LedColor::Purple),
            "cyan" => Ok(LedColor::Cyan),
            "white" => Ok(LedColor::White),
            other => Err(format!("unknown LED color '{}'", other)),
        }
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedColor::Red => "red",
            LedColor::Green => "green",
            LedColor::Yellow => "yellow",
            LedColor::Blue => "blue",
            LedColor::Purple => "purple",
            LedColor::Cyan => "cyan",
            LedColor::White => "white",
        };
        f.write_str(name)
    }
}

/// An LED mode command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCommand {
    Off,
    /// Constant color.
    Constant { red: u8, green: u8, blue: u8 },
    /// Cycle on and off with `delay_ms` between pulses.
    Breathe {
        color: LedColor,
        intensity: u8,
        delay_ms: u16,
    },
    /// Light up once, then turn off.
    OneShot { color: LedColor, intensity: u8 },
}

impl LedCommand {
    /// Breathe in red at 10% intensity every 3 seconds.
    pub fn breathe_default() -> Self {
        LedCommand::Breathe {
            color: LedColor::Red,
            intensity: 10,
            delay_ms: 3000,
        }
    }

    /// Encode the command as a characteristic payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5);
        match *self {
            LedCommand::Off => buf.put_u8(0),
            LedCommand::Constant { red, green, blue } => {
                buf.put_u8(1);
                buf.put_u8(red);
                buf.put_u8(green);
                buf.put_u8(blue);
            }
            LedCommand::Breathe {
                color,
                intensity,
                delay_ms,
            } => {
                buf.put_u8(2);
                buf.put_u8(color as u8);
                buf.put_u8(intensity);
                buf.put_u16_le(delay_ms);
            }
            LedCommand::OneShot { color, intensity } => {
                buf.put_u8(3);
                buf.put_u8(color as u8);
                buf.put_u8(intensity);
            }
        }
        buf
    }
}
