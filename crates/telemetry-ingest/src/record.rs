// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Canonical observation records.

use crate::units::{UnitRegistry, UnitSystem};
use crate::value::Value;
use std::collections::BTreeMap;

/// Key carrying the record timestamp in packet form.
pub const DATETIME_KEY: &str = "dateTime";

/// Key carrying the unit system code in packet form.
pub const US_UNITS_KEY: &str = "usUnits";

/// A normalized, timestamped observation record.
///
/// Produced by the payload parsers and immutable once queued.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// Canonical field name to value.
    pub fields: BTreeMap<String, Value>,
    /// Observation time in seconds since the Unix epoch.
    pub timestamp: f64,
    /// Unit system the values are expressed in.
    pub unit_system: UnitSystem,
}

impl CanonicalRecord {
    /// Create an empty record.
    pub fn new(timestamp: f64, unit_system: UnitSystem) -> Self {
        Self {
            fields: BTreeMap::new(),
            timestamp,
            unit_system,
        }
    }

    /// Add a field, builder style.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Check whether the record has no observation fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Packet form: the fields plus injected `dateTime` and `usUnits`.
    pub fn to_packet(&self) -> BTreeMap<String, Value> {
        let mut packet = self.fields.clone();
        packet.insert(DATETIME_KEY.to_string(), Value::Float(self.timestamp));
        packet.insert(
            US_UNITS_KEY.to_string(),
            Value::Int(self.unit_system.code()),
        );
        packet
    }

    /// Copy of this record expressed in `target`.
    ///
    /// Fields whose measurement is unknown to the registry, or whose value
    /// is not numeric, are carried over unchanged.
    pub fn to_unit_system(&self, target: UnitSystem, units: &dyn UnitRegistry) -> Self {
        if target == self.unit_system {
            return self.clone();
        }
        let mut out = CanonicalRecord::new(self.timestamp, target);
        for (name, value) in &self.fields {
            let converted = match (
                value.as_f64(),
                units.units_for_measurement(self.unit_system, name),
                units.units_for_measurement(target, name),
            ) {
                (Some(v), Some(from), Some(to)) if !matches!(value, Value::Bool(_)) => units
                    .convert(v, from, to)
                    .map(Value::Float)
                    .unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            };
            out.fields.insert(name.clone(), converted);
        }
        out
    }

    /// Overlay `other` onto this record; `other` wins on conflicts and
    /// its timestamp becomes the record timestamp.
    pub fn merge_from(&mut self, other: &CanonicalRecord) {
        for (name, value) in &other.fields {
            self.fields.insert(name.clone(), value.clone());
        }
        self.timestamp = other.timestamp;
        self.unit_system = other.unit_system;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::StandardUnits;

    #[test]
    fn test_to_packet_injects_keys() {
        let record = CanonicalRecord::new(100.0, UnitSystem::Metric).with_field("outTemp", 21.5);
        let packet = record.to_packet();
        assert_eq!(packet.get("outTemp"), Some(&Value::Float(21.5)));
        assert_eq!(packet.get(DATETIME_KEY), Some(&Value::Float(100.0)));
        assert_eq!(packet.get(US_UNITS_KEY), Some(&Value::Int(0x10)));
    }

    #[test]
    fn test_to_unit_system() {
        let units = StandardUnits::new();
        let record = CanonicalRecord::new(1.0, UnitSystem::Metric)
            .with_field("outTemp", 100.0)
            .with_field("label", "north")
            .with_field("mystery", 3.0);

        let us = record.to_unit_system(UnitSystem::Us, &units);
        assert_eq!(us.unit_system, UnitSystem::Us);
        match us.get("outTemp") {
            Some(Value::Float(v)) => assert!((v - 212.0).abs() < 1e-9),
            other => panic!("expected Float, got {:?}", other),
        }
        assert_eq!(us.get("label"), Some(&Value::Text("north".into())));
        assert_eq!(us.get("mystery"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_merge_from() {
        let mut a = CanonicalRecord::new(1.0, UnitSystem::Us)
            .with_field("x", 1.0)
            .with_field("y", 2.0);
        let b = CanonicalRecord::new(2.0, UnitSystem::Us).with_field("y", 3.0);
        a.merge_from(&b);
        assert_eq!(a.get("x"), Some(&Value::Float(1.0)));
        assert_eq!(a.get("y"), Some(&Value::Float(3.0)));
        assert_eq!(a.timestamp, 2.0);
    }
}
