// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Accumulator collaborator.
//!
//! Windowed reads hand every drained record to an accumulator that folds
//! them into one summary record. Real deployments supply their own;
//! [`MeanAccumulator`] is a small reference implementation.

use crate::record::CanonicalRecord;
use crate::units::UnitSystem;
use crate::value::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Half-open time interval `(start, stop]` in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub start: f64,
    pub stop: f64,
}

impl TimeSpan {
    /// Create a span.
    pub fn new(start: f64, stop: f64) -> Self {
        Self { start, stop }
    }

    /// Check whether `ts` lies in `(start, stop]`.
    pub fn contains(&self, ts: f64) -> bool {
        self.start < ts && ts <= self.stop
    }
}

/// A record fell outside the accumulator's span.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Record at {timestamp} is outside of ({}, {}]", .span.start, .span.stop)]
pub struct OutOfSpan {
    pub timestamp: f64,
    pub span: TimeSpan,
}

/// Folds records of one time span into a summary record.
pub trait Accumulator {
    /// Add a record; fails without side effects if it is out of span.
    fn add_record(&mut self, record: &CanonicalRecord) -> Result<(), OutOfSpan>;

    /// Check whether no record was added.
    fn is_empty(&self) -> bool;

    /// The summary record.
    fn get_record(&self) -> CanonicalRecord;
}

#[derive(Debug, Clone)]
enum Stat {
    Mean { sum: f64, count: u64 },
    Last(Value),
}

impl Stat {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Int(_) | Value::Float(_) => Stat::Mean {
                sum: value.as_f64().unwrap_or_default(),
                count: 1,
            },
            other => Stat::Last(other.clone()),
        }
    }

    fn apply(&mut self, value: &Value) {
        match (self, value) {
            (Stat::Mean { sum, count }, Value::Int(_) | Value::Float(_)) => {
                *sum += value.as_f64().unwrap_or_default();
                *count = count.saturating_add(1);
            }
            // Nulls never displace a known value.
            (_, Value::Null) => {}
            (stat, other) => *stat = Stat::from_value(other),
        }
    }

    fn value(&self) -> Value {
        match self {
            Stat::Mean { sum, count } if *count > 0 => Value::Float(sum / *count as f64),
            Stat::Mean { .. } => Value::Null,
            Stat::Last(v) => v.clone(),
        }
    }
}

/// Averages numeric fields; keeps the last value of any other field.
#[derive(Debug, Clone)]
pub struct MeanAccumulator {
    span: TimeSpan,
    unit_system: Option<UnitSystem>,
    stats: BTreeMap<String, Stat>,
    records: usize,
}

impl MeanAccumulator {
    /// Create an accumulator for `span`.
    pub fn new(span: TimeSpan) -> Self {
        Self {
            span,
            unit_system: None,
            stats: BTreeMap::new(),
            records: 0,
        }
    }
}

impl Accumulator for MeanAccumulator {
    fn add_record(&mut self, record: &CanonicalRecord) -> Result<(), OutOfSpan> {
        if !self.span.contains(record.timestamp) {
            return Err(OutOfSpan {
                timestamp: record.timestamp,
                span: self.span,
            });
        }
        self.unit_system.get_or_insert(record.unit_system);
        for (name, value) in &record.fields {
            match self.stats.get_mut(name) {
                Some(stat) => stat.apply(value),
                None => {
                    self.stats.insert(name.clone(), Stat::from_value(value));
                }
            }
        }
        self.records += 1;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.records == 0
    }

    fn get_record(&self) -> CanonicalRecord {
        let mut record =
            CanonicalRecord::new(self.span.stop, self.unit_system.unwrap_or_default());
        for (name, stat) in &self.stats {
            record.fields.insert(name.clone(), stat.value());
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_is_half_open() {
        let span = TimeSpan::new(0.0, 300.0);
        assert!(!span.contains(0.0));
        assert!(span.contains(0.5));
        assert!(span.contains(300.0));
        assert!(!span.contains(300.1));
    }

    #[test]
    fn test_mean_and_last() {
        let mut acc = MeanAccumulator::new(TimeSpan::new(0.0, 300.0));
        assert!(acc.is_empty());
        acc.add_record(
            &CanonicalRecord::new(10.0, UnitSystem::Metric)
                .with_field("outTemp", 20.0)
                .with_field("status", "ok"),
        )
        .expect("in span");
        acc.add_record(
            &CanonicalRecord::new(20.0, UnitSystem::Metric)
                .with_field("outTemp", 22.0)
                .with_field("status", "degraded"),
        )
        .expect("in span");

        let record = acc.get_record();
        assert_eq!(record.timestamp, 300.0);
        assert_eq!(record.unit_system, UnitSystem::Metric);
        assert_eq!(record.get("outTemp"), Some(&Value::Float(21.0)));
        assert_eq!(record.get("status"), Some(&Value::Text("degraded".into())));
    }

    #[test]
    fn test_out_of_span_rejected() {
        let mut acc = MeanAccumulator::new(TimeSpan::new(0.0, 300.0));
        let err = acc
            .add_record(&CanonicalRecord::new(301.0, UnitSystem::Us).with_field("x", 1.0))
            .expect_err("out of span");
        assert_eq!(err.timestamp, 301.0);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_null_does_not_displace() {
        let mut acc = MeanAccumulator::new(TimeSpan::new(0.0, 10.0));
        acc.add_record(&CanonicalRecord::new(1.0, UnitSystem::Us).with_field("x", 4.0))
            .expect("in span");
        acc.add_record(&CanonicalRecord::new(2.0, UnitSystem::Us).with_field("x", Value::Null))
            .expect("in span");
        assert_eq!(acc.get_record().get("x"), Some(&Value::Float(4.0)));
    }
}
