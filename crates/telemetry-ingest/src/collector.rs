// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correlation of fields arriving in separate messages.
//!
//! Vector components such as wind speed and direction are often published
//! one per message. The collector gathers them into one pending record and
//! hands it out when a component would be overwritten, or when asked.

use crate::record::CanonicalRecord;
use crate::units::UnitSystem;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Strategy interface shared by both collector lifetimes.
pub trait Collector: Send + fmt::Debug {
    /// Add a record routed to the collector.
    ///
    /// With `field` set only that field is taken from the record.
    /// Returns the previously pending record if this one displaced it.
    fn add(&mut self, record: &CanonicalRecord, field: Option<&str>) -> Option<CanonicalRecord>;

    /// Take the pending record, if any.
    fn flush(&mut self) -> Option<CanonicalRecord>;

    /// Check whether nothing is pending.
    fn is_empty(&self) -> bool;

    /// Whether pending data is flushed at the end of every drain.
    fn flushes_at_window_end(&self) -> bool;
}

/// Pending state shared by both strategies.
#[derive(Debug, Clone)]
struct Pending {
    tracked: BTreeSet<String>,
    fields: BTreeMap<String, Value>,
    timestamp: f64,
    unit_system: UnitSystem,
}

impl Pending {
    fn new(tracked: BTreeSet<String>) -> Self {
        Self {
            tracked,
            fields: BTreeMap::new(),
            timestamp: 0.0,
            unit_system: UnitSystem::default(),
        }
    }

    fn add(&mut self, record: &CanonicalRecord, field: Option<&str>) -> Option<CanonicalRecord> {
        let incoming: Vec<(&String, &Value)> = match field {
            Some(name) => record.fields.get_key_value(name).into_iter().collect(),
            None => record.fields.iter().collect(),
        };
        if incoming.is_empty() {
            return None;
        }

        let collides = incoming.iter().any(|(name, _)| self.fields.contains_key(*name));
        let unit_changed = !self.fields.is_empty() && self.unit_system != record.unit_system;
        let flushed = if collides || unit_changed {
            self.take()
        } else {
            None
        };

        if self.fields.is_empty() {
            self.timestamp = record.timestamp;
            self.unit_system = record.unit_system;
        }
        for (name, value) in incoming {
            if !self.tracked.contains(name) {
                tracing::debug!("Collector received untracked field '{}'", name);
            }
            self.fields.insert(name.clone(), value.clone());
        }
        flushed
    }

    fn take(&mut self) -> Option<CanonicalRecord> {
        if self.fields.is_empty() {
            return None;
        }
        Some(CanonicalRecord {
            fields: std::mem::take(&mut self.fields),
            timestamp: self.timestamp,
            unit_system: self.unit_system,
        })
    }
}

/// Collector that keeps partial vectors across windowed reads.
#[derive(Debug, Clone)]
pub struct CrossWindowCollector {
    pending: Pending,
}

impl CrossWindowCollector {
    /// Create a collector for the given field names.
    pub fn new(tracked: BTreeSet<String>) -> Self {
        Self {
            pending: Pending::new(tracked),
        }
    }
}

impl Collector for CrossWindowCollector {
    fn add(&mut self, record: &CanonicalRecord, field: Option<&str>) -> Option<CanonicalRecord> {
        self.pending.add(record, field)
    }

    fn flush(&mut self) -> Option<CanonicalRecord> {
        self.pending.take()
    }

    fn is_empty(&self) -> bool {
        self.pending.fields.is_empty()
    }

    fn flushes_at_window_end(&self) -> bool {
        false
    }
}

/// Collector built fresh for each drain and emptied at its end.
#[derive(Debug, Clone)]
pub struct PerWindowCollector {
    pending: Pending,
}

impl PerWindowCollector {
    /// Create a collector for the given field names.
    pub fn new(tracked: BTreeSet<String>) -> Self {
        Self {
            pending: Pending::new(tracked),
        }
    }
}

impl Collector for PerWindowCollector {
    fn add(&mut self, record: &CanonicalRecord, field: Option<&str>) -> Option<CanonicalRecord> {
        self.pending.add(record, field)
    }

    fn flush(&mut self) -> Option<CanonicalRecord> {
        self.pending.take()
    }

    fn is_empty(&self) -> bool {
        self.pending.fields.is_empty()
    }

    fn flushes_at_window_end(&self) -> bool {
        true
    }
}

/// Build the collector for a strategy.
pub fn new_collector(across_windows: bool, tracked: BTreeSet<String>) -> Box<dyn Collector> {
    if across_windows {
        Box::new(CrossWindowCollector::new(tracked))
    } else {
        Box::new(PerWindowCollector::new(tracked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked() -> BTreeSet<String> {
        ["windDir", "windSpeed"].iter().map(|s| s.to_string()).collect()
    }

    fn component(ts: f64, name: &str, value: f64) -> CanonicalRecord {
        CanonicalRecord::new(ts, UnitSystem::Us).with_field(name, value)
    }

    #[test]
    fn test_components_merge_until_overwrite() {
        let mut collector = CrossWindowCollector::new(tracked());
        assert!(collector.add(&component(1.0, "windSpeed", 5.0), Some("windSpeed")).is_none());
        assert!(collector.add(&component(2.0, "windDir", 90.0), Some("windDir")).is_none());

        let flushed = collector
            .add(&component(3.0, "windSpeed", 7.0), Some("windSpeed"))
            .expect("flush on overwrite");
        assert_eq!(flushed.timestamp, 1.0);
        assert_eq!(flushed.get("windSpeed"), Some(&Value::Float(5.0)));
        assert_eq!(flushed.get("windDir"), Some(&Value::Float(90.0)));

        let rest = collector.flush().expect("pending");
        assert_eq!(rest.timestamp, 3.0);
        assert_eq!(rest.fields.len(), 1);
        assert!(collector.is_empty());
        assert!(collector.flush().is_none());
    }

    #[test]
    fn test_unit_system_change_flushes() {
        let mut collector = CrossWindowCollector::new(tracked());
        collector.add(&component(1.0, "windSpeed", 5.0), None);
        let metric = CanonicalRecord::new(2.0, UnitSystem::Metric).with_field("windDir", 10.0);
        let flushed = collector.add(&metric, Some("windDir")).expect("flush");
        assert_eq!(flushed.unit_system, UnitSystem::Us);
        assert_eq!(collector.flush().map(|r| r.unit_system), Some(UnitSystem::Metric));
    }

    #[test]
    fn test_missing_field_is_ignored() {
        let mut collector = CrossWindowCollector::new(tracked());
        assert!(collector.add(&component(1.0, "windSpeed", 5.0), Some("windDir")).is_none());
        assert!(collector.is_empty());
    }

    #[test]
    fn test_strategies() {
        assert!(!new_collector(true, tracked()).flushes_at_window_end());
        assert!(new_collector(false, tracked()).flushes_at_window_end());
    }
}
