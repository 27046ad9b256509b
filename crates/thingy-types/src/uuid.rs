//! Bluetooth UUIDs for Thingy devices.
//!
//! The MQTT gateway publishes every GATT notification on a topic built from
//! the device address and the lowercase, hyphenated service and
//! characteristic UUIDs listed here.

use uuid::{Uuid, uuid};

// --- Thingy Service UUIDs ---

/// Configuration service (device name, advertising parameters).
pub const CONFIGURATION_SERVICE: Uuid = uuid!("ef680100-9b35-4933-9b10-52ffa9740042");

/// Environment service (temperature, pressure, humidity, gas, color).
pub const ENVIRONMENT_SERVICE: Uuid = uuid!("ef680200-9b35-4933-9b10-52ffa9740042");

/// User interface service (LED, button).
pub const USER_INTERFACE_SERVICE: Uuid = uuid!("ef680300-9b35-4933-9b10-52ffa9740042");

/// Motion service.
pub const MOTION_SERVICE: Uuid = uuid!("ef680400-9b35-4933-9b10-52ffa9740042");

// --- Standard BLE Service UUIDs ---

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Topic segment the gateway uses in place of a service UUID to report
/// connect and disconnect events.
pub const CONNECTIVITY_SERVICE_ID: &str = "connected";

// --- Configuration Characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("ef680101-9b35-4933-9b10-52ffa9740042");

// --- Environment Characteristic UUIDs ---

/// Temperature characteristic.
pub const TEMPERATURE: Uuid = uuid!("ef680201-9b35-4933-9b10-52ffa9740042");

/// Pressure characteristic.
pub const PRESSURE: Uuid = uuid!("ef680202-9b35-4933-9b10-52ffa9740042");

/// Humidity characteristic.
pub const HUMIDITY: Uuid = uuid!("ef680203-9b35-4933-9b10-52ffa9740042");

/// Gas (eCO2 / TVOC) characteristic.
pub const AIR_QUALITY: Uuid = uuid!("ef680204-9b35-4933-9b10-52ffa9740042");

/// Color sensor characteristic.
pub const COLOR: Uuid = uuid!("ef680205-9b35-4933-9b10-52ffa9740042");

// --- User Interface Characteristic UUIDs ---

/// LED characteristic.
pub const LED: Uuid = uuid!("ef680301-9b35-4933-9b10-52ffa9740042");

/// Button characteristic.
pub const BUTTON: Uuid = uuid!("ef680302-9b35-4933-9b10-52ffa9740042");

// --- Battery Characteristic UUIDs ---

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thingy_base_uuid() {
        // Every Thingy UUID shares the same base and differs in the 32-bit prefix
        for id in [
            CONFIGURATION_SERVICE,
            ENVIRONMENT_SERVICE,
            USER_INTERFACE_SERVICE,
            MOTION_SERVICE,
            DEVICE_NAME,
            TEMPERATURE,
            PRESSURE,
            HUMIDITY,
            AIR_QUALITY,
            COLOR,
            LED,
            BUTTON,
        ] {
            assert!(id.to_string().ends_with("-9b35-4933-9b10-52ffa9740042"));
            assert!(id.to_string().starts_with("ef68"));
        }
    }

    #[test]
    fn test_battery_uuids_use_bluetooth_base() {
        assert_eq!(
            BATTERY_SERVICE.to_string(),
            "0000180f-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_characteristics_live_under_their_service() {
        // Thingy characteristics are numbered after their service (0x0100 -> 0x0101)
        assert_eq!(DEVICE_NAME.as_bytes()[2], CONFIGURATION_SERVICE.as_bytes()[2]);
        assert_eq!(BUTTON.as_bytes()[2], USER_INTERFACE_SERVICE.as_bytes()[2]);
        assert_eq!(COLOR.as_bytes()[2], 0x02);
        assert_eq!(COLOR.as_bytes()[3], 0x05);
    }

    #[test]
    fn test_connectivity_id_is_not_a_uuid() {
        assert!(Uuid::parse_str(CONNECTIVITY_SERVICE_ID).is_err());
    }
}
