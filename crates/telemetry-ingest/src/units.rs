// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Unit systems and the unit/measurement registry.
//!
//! The ingestion core only needs three questions answered: which unit a
//! named measurement uses in a given unit system, how to convert a value
//! between two units, and which unit and unit-system names exist. The
//! [`UnitRegistry`] trait carries exactly that; [`StandardUnits`] is a
//! built-in registry covering common weather observations.

use std::fmt;

/// Unit system an observation record is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitSystem {
    /// US customary units.
    #[default]
    Us,
    /// Metric units, speeds in km/h, rain in cm.
    Metric,
    /// Metric units, speeds in m/s, rain in mm.
    MetricWx,
}

impl UnitSystem {
    /// Wire code stored under `usUnits`.
    pub fn code(&self) -> i64 {
        match self {
            Self::Us => 0x01,
            Self::Metric => 0x10,
            Self::MetricWx => 0x11,
        }
    }

    /// Unit system for a `usUnits` code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0x01 => Some(Self::Us),
            0x10 => Some(Self::Metric),
            0x11 => Some(Self::MetricWx),
            _ => None,
        }
    }

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Metric => "METRIC",
            Self::MetricWx => "METRICWX",
        }
    }

    /// Parse a configuration name (exact, upper case).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "US" => Some(Self::Us),
            "METRIC" => Some(Self::Metric),
            "METRICWX" => Some(Self::MetricWx),
            _ => None,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit/measurement registry consulted by configuration resolution,
/// parsing and windowed reads.
pub trait UnitRegistry: Send + Sync {
    /// Unit of `measurement` in `system`, if the measurement is known.
    fn units_for_measurement(&self, system: UnitSystem, measurement: &str) -> Option<&str>;

    /// Convert `value` from `from` to `to`. `None` if no conversion exists.
    fn convert(&self, value: f64, from: &str, to: &str) -> Option<f64>;

    /// Names of unit systems accepted in configuration.
    fn known_unit_systems(&self) -> Vec<&'static str>;

    /// Check whether a unit name is known.
    fn is_known_unit(&self, unit: &str) -> bool;
}

/// Measurement groups understood by [`StandardUnits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Temperature,
    Pressure,
    Speed,
    Rain,
    RainRate,
    Direction,
    Percent,
    Voltage,
}

impl Group {
    fn unit(&self, system: UnitSystem) -> &'static str {
        use UnitSystem::*;
        match (self, system) {
            (Group::Temperature, Us) => "degree_F",
            (Group::Temperature, _) => "degree_C",
            (Group::Pressure, Us) => "inHg",
            (Group::Pressure, _) => "mbar",
            (Group::Speed, Us) => "mile_per_hour",
            (Group::Speed, Metric) => "km_per_hour",
            (Group::Speed, MetricWx) => "meter_per_second",
            (Group::Rain, Us) => "inch",
            (Group::Rain, Metric) => "cm",
            (Group::Rain, MetricWx) => "mm",
            (Group::RainRate, Us) => "inch_per_hour",
            (Group::RainRate, Metric) => "cm_per_hour",
            (Group::RainRate, MetricWx) => "mm_per_hour",
            (Group::Direction, _) => "degree_compass",
            (Group::Percent, _) => "percent",
            (Group::Voltage, _) => "volt",
        }
    }
}

const MEASUREMENTS: &[(&str, Group)] = &[
    ("outTemp", Group::Temperature),
    ("inTemp", Group::Temperature),
    ("extraTemp1", Group::Temperature),
    ("extraTemp2", Group::Temperature),
    ("extraTemp3", Group::Temperature),
    ("dewpoint", Group::Temperature),
    ("heatindex", Group::Temperature),
    ("windchill", Group::Temperature),
    ("barometer", Group::Pressure),
    ("pressure", Group::Pressure),
    ("altimeter", Group::Pressure),
    ("windSpeed", Group::Speed),
    ("windGust", Group::Speed),
    ("rain", Group::Rain),
    ("rainRate", Group::RainRate),
    ("windDir", Group::Direction),
    ("windGustDir", Group::Direction),
    ("outHumidity", Group::Percent),
    ("inHumidity", Group::Percent),
    ("consBatteryVoltage", Group::Voltage),
    ("supplyVoltage", Group::Voltage),
];

const UNITS: &[&str] = &[
    "degree_F",
    "degree_C",
    "inHg",
    "mbar",
    "hPa",
    "mmHg",
    "mile_per_hour",
    "km_per_hour",
    "meter_per_second",
    "knot",
    "inch",
    "cm",
    "mm",
    "inch_per_hour",
    "cm_per_hour",
    "mm_per_hour",
    "degree_compass",
    "percent",
    "volt",
];

/// Built-in registry for common weather measurements.
#[derive(Debug, Clone, Default)]
pub struct StandardUnits;

impl StandardUnits {
    /// Create the registry.
    pub fn new() -> Self {
        Self
    }

    /// Value of one `unit` in the group's base unit, for linear units.
    fn linear_factor(unit: &str) -> Option<(&'static str, f64)> {
        match unit {
            "inHg" => Some(("pressure", 33.863_886_666_7)),
            "mbar" | "hPa" => Some(("pressure", 1.0)),
            "mmHg" => Some(("pressure", 1.333_224)),
            "mile_per_hour" => Some(("speed", 1.609_344)),
            "km_per_hour" => Some(("speed", 1.0)),
            "meter_per_second" => Some(("speed", 3.6)),
            "knot" => Some(("speed", 1.852)),
            "inch" => Some(("length", 25.4)),
            "cm" => Some(("length", 10.0)),
            "mm" => Some(("length", 1.0)),
            "inch_per_hour" => Some(("rate", 25.4)),
            "cm_per_hour" => Some(("rate", 10.0)),
            "mm_per_hour" => Some(("rate", 1.0)),
            "degree_compass" => Some(("direction", 1.0)),
            "percent" => Some(("percent", 1.0)),
            "volt" => Some(("volt", 1.0)),
            _ => None,
        }
    }
}

impl UnitRegistry for StandardUnits {
    fn units_for_measurement(&self, system: UnitSystem, measurement: &str) -> Option<&str> {
        MEASUREMENTS
            .iter()
            .find(|(name, _)| *name == measurement)
            .map(|(_, group)| group.unit(system))
    }

    fn convert(&self, value: f64, from: &str, to: &str) -> Option<f64> {
        if from == to {
            return Some(value);
        }
        match (from, to) {
            ("degree_F", "degree_C") => return Some((value - 32.0) * 5.0 / 9.0),
            ("degree_C", "degree_F") => return Some(value * 9.0 / 5.0 + 32.0),
            _ => {}
        }
        let (from_dim, from_factor) = Self::linear_factor(from)?;
        let (to_dim, to_factor) = Self::linear_factor(to)?;
        if from_dim != to_dim {
            return None;
        }
        Some(value * from_factor / to_factor)
    }

    fn known_unit_systems(&self) -> Vec<&'static str> {
        vec!["US", "METRIC", "METRICWX"]
    }

    fn is_known_unit(&self, unit: &str) -> bool {
        UNITS.contains(&unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_system_codes() {
        for system in [UnitSystem::Us, UnitSystem::Metric, UnitSystem::MetricWx] {
            assert_eq!(UnitSystem::from_code(system.code()), Some(system));
            assert_eq!(UnitSystem::parse(system.as_str()), Some(system));
        }
        assert_eq!(UnitSystem::from_code(2), None);
        assert_eq!(UnitSystem::parse("metric"), None);
    }

    #[test]
    fn test_units_for_measurement() {
        let units = StandardUnits::new();
        assert_eq!(
            units.units_for_measurement(UnitSystem::Us, "outTemp"),
            Some("degree_F")
        );
        assert_eq!(
            units.units_for_measurement(UnitSystem::MetricWx, "windSpeed"),
            Some("meter_per_second")
        );
        assert_eq!(units.units_for_measurement(UnitSystem::Us, "unknown"), None);
    }

    #[test]
    fn test_temperature_conversion() {
        let units = StandardUnits::new();
        let f = units.convert(100.0, "degree_C", "degree_F").expect("convert");
        assert!((f - 212.0).abs() < 1e-9);
        let c = units.convert(32.0, "degree_F", "degree_C").expect("convert");
        assert!(c.abs() < 1e-9);
    }

    #[test]
    fn test_linear_conversion() {
        let units = StandardUnits::new();
        let kph = units
            .convert(10.0, "meter_per_second", "km_per_hour")
            .expect("convert");
        assert!((kph - 36.0).abs() < 1e-9);
        let mm = units.convert(1.0, "inch", "mm").expect("convert");
        assert!((mm - 25.4).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_conversion() {
        let units = StandardUnits::new();
        assert_eq!(units.convert(1.0, "inch", "mbar"), None);
        assert_eq!(units.convert(1.0, "furlong", "mm"), None);
    }

    #[test]
    fn test_known_units() {
        let units = StandardUnits::new();
        assert!(units.is_known_unit("degree_C"));
        assert!(!units.is_known_unit("degree_K"));
        assert_eq!(units.known_unit_systems().len(), 3);
    }
}
