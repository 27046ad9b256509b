//! Bidirectional identifier tables.
//!
//! Services and characteristics are addressed on the bus by opaque ids (UUID
//! strings). These tables map them to stable names and back. They are
//! compile-time constants, so they never change while the process runs.
//!
//! Ids that are not in a table are kept as [`Identifier::Raw`] so that newer
//! device firmware passes through instead of failing.

use core::fmt;

use uuid::Uuid;

use crate::uuid as ids;

/// A table that maps wire ids to names.
pub trait IdTable: Sized + Copy {
    /// Look up an entry by its wire id (case-insensitive).
    fn from_id(id: &str) -> Option<Self>;

    /// The wire id of this entry.
    fn id(&self) -> String;

    /// The stable name of this entry.
    fn as_str(&self) -> &'static str;

    /// Look up an entry by its stable name.
    fn from_name(name: &str) -> Option<Self>;
}

/// Known GATT services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceName {
    /// Connect/disconnect pseudo-service reported by the gateway.
    Connectivity,
    Configuration,
    Environment,
    UserInterface,
    Motion,
    Battery,
}

impl ServiceName {
    /// All services, in table order.
    pub const ALL: [ServiceName; 6] = [
        ServiceName::Connectivity,
        ServiceName::Configuration,
        ServiceName::Environment,
        ServiceName::UserInterface,
        ServiceName::Motion,
        ServiceName::Battery,
    ];

    fn uuid(&self) -> Option<Uuid> {
        match self {
            ServiceName::Connectivity => None,
            ServiceName::Configuration => Some(ids::CONFIGURATION_SERVICE),
            ServiceName::Environment => Some(ids::ENVIRONMENT_SERVICE),
            ServiceName::UserInterface => Some(ids::USER_INTERFACE_SERVICE),
            ServiceName::Motion => Some(ids::MOTION_SERVICE),
            ServiceName::Battery => Some(ids::BATTERY_SERVICE),
        }
    }
}

impl IdTable for ServiceName {
    fn from_id(id: &str) -> Option<Self> {
        if id.eq_ignore_ascii_case(ids::CONNECTIVITY_SERVICE_ID) {
            return Some(ServiceName::Connectivity);
        }
        let uuid = Uuid::parse_str(id).ok()?;
        Self::ALL.into_iter().find(|s| s.uuid() == Some(uuid))
    }

    fn id(&self) -> String {
        match self.uuid() {
            Some(uuid) => uuid.to_string(),
            None => ids::CONNECTIVITY_SERVICE_ID.to_string(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Connectivity => "connectivity",
            ServiceName::Configuration => "configuration",
            ServiceName::Environment => "environment",
            ServiceName::UserInterface => "user_interface",
            ServiceName::Motion => "motion",
            ServiceName::Battery => "battery",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

/// Known GATT characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicName {
    /// Device name, used by the discovery handshake.
    DeviceName,
    Temperature,
    Pressure,
    Humidity,
    AirQuality,
    /// Color sensor sample (red, green, blue, clear).
    Color,
    Led,
    Button,
    BatteryLevel,
}

impl CharacteristicName {
    /// All characteristics, in table order.
    pub const ALL: [CharacteristicName; 9] = [
        CharacteristicName::DeviceName,
        CharacteristicName::Temperature,
        CharacteristicName::Pressure,
        CharacteristicName::Humidity,
        CharacteristicName::AirQuality,
        CharacteristicName::Color,
        CharacteristicName::Led,
        CharacteristicName::Button,
        CharacteristicName::BatteryLevel,
    ];

    fn uuid(&self) -> Uuid {
        match self {
            CharacteristicName::DeviceName => ids::DEVICE_NAME,
            CharacteristicName::Temperature => ids::TEMPERATURE,
            CharacteristicName::Pressure => ids::PRESSURE,
            CharacteristicName::Humidity => ids::HUMIDITY,
            CharacteristicName::AirQuality => ids::AIR_QUALITY,
            CharacteristicName::Color => ids::COLOR,
            CharacteristicName::Led => ids::LED,
            CharacteristicName::Button => ids::BUTTON,
            CharacteristicName::BatteryLevel => ids::BATTERY_LEVEL,
        }
    }

    /// The service this characteristic belongs to.
    pub fn service(&self) -> ServiceName {
        match self {
            CharacteristicName::DeviceName => ServiceName::Configuration,
            CharacteristicName::Temperature
            | CharacteristicName::Pressure
            | CharacteristicName::Humidity
            | CharacteristicName::AirQuality
            | CharacteristicName::Color => ServiceName::Environment,
            CharacteristicName::Led | CharacteristicName::Button => ServiceName::UserInterface,
            CharacteristicName::BatteryLevel => ServiceName::Battery,
        }
    }
}

impl IdTable for CharacteristicName {
    fn from_id(id: &str) -> Option<Self> {
        let uuid = Uuid::parse_str(id).ok()?;
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    fn id(&self) -> String {
        self.uuid().to_string()
    }

    fn as_str(&self) -> &'static str {
        match self {
            CharacteristicName::DeviceName => "name",
            CharacteristicName::Temperature => "temperature",
            CharacteristicName::Pressure => "pressure",
            CharacteristicName::Humidity => "humidity",
            CharacteristicName::AirQuality => "air_quality",
            CharacteristicName::Color => "light_intensity",
            CharacteristicName::Led => "led",
            CharacteristicName::Button => "button",
            CharacteristicName::BatteryLevel => "battery_level",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// A resolved or pass-through identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier<N> {
    /// The id was found in the table.
    Named(N),
    /// The id is not in the table and is kept verbatim.
    Raw(String),
}

impl<N: IdTable> Identifier<N> {
    /// Resolve a wire id against the table.
    pub fn resolve(id: &str) -> Self {
        match N::from_id(id) {
            Some(name) => Identifier::Named(name),
            None => Identifier::Raw(id.to_string()),
        }
    }

    /// The table entry, if the id was known.
    pub fn named(&self) -> Option<N> {
        match self {
            Identifier::Named(name) => Some(*name),
            Identifier::Raw(_) => None,
        }
    }

    /// Whether this identifier resolved to `name`.
    pub fn is(&self, name: N) -> bool
    where
        N: PartialEq,
    {
        self.named() == Some(name)
    }

    /// The wire id, whether or not it was resolved.
    pub fn wire_id(&self) -> String {
        match self {
            Identifier::Named(name) => name.id(),
            Identifier::Raw(raw) => raw.clone(),
        }
    }
}

impl<N: IdTable> fmt::Display for Identifier<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Named(name) => f.write_str(name.as_str()),
            Identifier::Raw(raw) => f.write_str(raw),
        }
    }
}

/// Service identifier as decoded from a topic.
pub type ServiceId = Identifier<ServiceName>;

/// Characteristic identifier as decoded from a topic.
pub type CharacteristicId = Identifier<CharacteristicName>;
