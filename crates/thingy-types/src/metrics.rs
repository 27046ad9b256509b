//! Metric names, units and the mapping from readings to metric values.

use core::fmt;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::color::{is_door_open, to_rgb};
use crate::readings::Reading;

/// Names of the metrics published and checked against thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MetricName {
    LightIntensity,
    /// Derived from the color sample; its threshold value is the number of
    /// seconds the door has been open.
    Door,
    Humidity,
    Temperature,
    AirQuality,
    Eco2,
    Tvoc,
    BatteryLevel,
    Button,
    Pressure,
}

impl MetricName {
    pub const ALL: [MetricName; 10] = [
        MetricName::LightIntensity,
        MetricName::Door,
        MetricName::Humidity,
        MetricName::Temperature,
        MetricName::AirQuality,
        MetricName::Eco2,
        MetricName::Tvoc,
        MetricName::BatteryLevel,
        MetricName::Button,
        MetricName::Pressure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::LightIntensity => "light_intensity",
            MetricName::Door => "door",
            MetricName::Humidity => "humidity",
            MetricName::Temperature => "temperature",
            MetricName::AirQuality => "air_quality",
            MetricName::Eco2 => "eco2",
            MetricName::Tvoc => "tvoc",
            MetricName::BatteryLevel => "battery_level",
            MetricName::Button => "button",
            MetricName::Pressure => "pressure",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Unit suffix used in notification messages.
    pub fn unit(&self) -> &'static str {
        match self {
            MetricName::Door => "s",
            MetricName::Humidity | MetricName::BatteryLevel => "%",
            MetricName::Temperature => "°C",
            MetricName::Eco2 => "ppm",
            MetricName::Tvoc => "ppb",
            MetricName::Pressure => "hPa",
            MetricName::LightIntensity | MetricName::AirQuality | MetricName::Button => "",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metric field value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
}

impl FieldValue {
    /// Numeric view used for threshold comparison (`true` is 1, `false` is 0).
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Number(n) => *n,
            FieldValue::Flag(true) => 1.0,
            FieldValue::Flag(false) => 0.0,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::Number(f64::from(value))
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

/// One measurement derived from a reading, as published to the metric sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub metric: MetricName,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Measurement {
    fn new<const N: usize>(metric: MetricName, fields: [(&str, FieldValue); N]) -> Self {
        Self {
            metric,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

impl Reading {
    /// Measurements published for this reading.
    ///
    /// A color sample yields two measurements: the normalized RGB light
    /// intensity and the derived door state.
    pub fn measurements(&self) -> Vec<Measurement> {
        match self {
            Reading::Color(sample) => {
                let rgb = to_rgb(sample);
                vec![
                    Measurement::new(
                        MetricName::LightIntensity,
                        [
                            ("red", rgb.red.into()),
                            ("green", rgb.green.into()),
                            ("blue", rgb.blue.into()),
                        ],
                    ),
                    Measurement::new(MetricName::Door, [("open", is_door_open(sample).into())]),
                ]
            }
            Reading::Humidity(h) => vec![Measurement::new(
                MetricName::Humidity,
                [("humidity", (*h).into())],
            )],
            Reading::Temperature(t) => vec![Measurement::new(
                MetricName::Temperature,
                [("temperature", (*t).into())],
            )],
            Reading::Pressure(p) => vec![Measurement::new(
                MetricName::Pressure,
                [("pressure", (*p).into())],
            )],
            Reading::AirQuality(aq) => vec![Measurement::new(
                MetricName::AirQuality,
                [("eco2", aq.eco2.into()), ("tvoc", aq.tvoc.into())],
            )],
            Reading::BatteryLevel(b) => vec![Measurement::new(
                MetricName::BatteryLevel,
                [("battery_level", (*b).into())],
            )],
            Reading::Button(pressed) => vec![Measurement::new(
                MetricName::Button,
                [("pressed", (*pressed).into())],
            )],
        }
    }

    /// Metric values checked against user thresholds.
    pub fn threshold_values(&self) -> Vec<(MetricName, FieldValue)> {
        match self {
            Reading::Color(sample) => vec![(MetricName::Door, is_door_open(sample).into())],
            Reading::Humidity(h) => vec![(MetricName::Humidity, (*h).into())],
            Reading::Temperature(t) => vec![(MetricName::Temperature, (*t).into())],
            Reading::Pressure(p) => vec![(MetricName::Pressure, (*p).into())],
            Reading::AirQuality(aq) => vec![
                (MetricName::Eco2, aq.eco2.into()),
                (MetricName::Tvoc, aq.tvoc.into()),
            ],
            Reading::BatteryLevel(b) => vec![(MetricName::BatteryLevel, (*b).into())],
            Reading::Button(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorSample;
    use crate::readings::AirQuality;

    #[test]
    fn test_metric_names_round_trip() {
        for metric in MetricName::ALL {
            assert_eq!(MetricName::from_name(metric.as_str()), Some(metric));
        }
        assert_eq!(MetricName::from_name("co2"), None);
    }

    #[test]
    fn test_units() {
        assert_eq!(MetricName::Temperature.unit(), "°C");
        assert_eq!(MetricName::Door.unit(), "s");
        assert_eq!(MetricName::Eco2.unit(), "ppm");
        assert_eq!(MetricName::Tvoc.unit(), "ppb");
        assert_eq!(MetricName::Humidity.unit(), "%");
        assert_eq!(MetricName::Button.unit(), "");
    }

    #[test]
    fn test_color_yields_light_and_door() {
        let reading = Reading::Color(ColorSample {
            red: 0,
            green: 0,
            blue: 0,
            clear: 400,
        });
        let measurements = reading.measurements();
        assert_eq!(measurements.len(), 2);
        assert_eq!(measurements[0].metric, MetricName::LightIntensity);
        assert_eq!(measurements[0].fields["red"], FieldValue::Number(0.0));
        assert_eq!(measurements[1].metric, MetricName::Door);
        assert_eq!(measurements[1].fields["open"], FieldValue::Flag(false));

        assert_eq!(
            reading.threshold_values(),
            vec![(MetricName::Door, FieldValue::Flag(false))]
        );
    }

    #[test]
    fn test_air_quality_checks_both_gases() {
        let reading = Reading::AirQuality(AirQuality { eco2: 450, tvoc: 12 });
        assert_eq!(
            reading.threshold_values(),
            vec![
                (MetricName::Eco2, FieldValue::Number(450.0)),
                (MetricName::Tvoc, FieldValue::Number(12.0)),
            ]
        );
        let measurements = reading.measurements();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].fields.len(), 2);
    }

    #[test]
    fn test_button_is_never_checked() {
        assert!(Reading::Button(true).threshold_values().is_empty());
        assert_eq!(Reading::Button(true).measurements().len(), 1);
    }

    #[test]
    fn test_field_value_serialization() {
        let json = serde_json::to_string(&FieldValue::Number(21.5)).unwrap();
        assert_eq!(json, "21.5");
        let json = serde_json::to_string(&FieldValue::Flag(true)).unwrap();
        assert_eq!(json, "true");
        assert_eq!(FieldValue::Flag(true).as_f64(), 1.0);
    }
}
