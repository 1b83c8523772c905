// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload parsers.
//!
//! Each grammar only knows how to pull `(key, raw value)` pairs out of a
//! payload. Everything after that is shared: ignore rules, conversion,
//! message filters, unit conversion, counter deltas and renaming.
//!
//! The shared pipeline runs in two passes so that a message which is
//! filtered or aborted never touches counter state.

pub mod keyword;
pub mod nested;
pub mod single;
pub mod timestamp;

pub use keyword::KeywordParser;
pub use nested::NestedParser;
pub use single::SingleValueParser;

use crate::config::{ConversionErrorPolicy, FieldRule, PayloadGrammar, TopicRule};
use crate::counter::CounterState;
use crate::record::{CanonicalRecord, DATETIME_KEY, US_UNITS_KEY};
use crate::units::{UnitRegistry, UnitSystem};
use crate::value::Value;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Per-message parse failures. The message is dropped, never partially queued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Payload is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Payload is not an object")]
    NotAnObject,

    #[error("Empty payload")]
    EmptyPayload,

    #[error("No usable fields in payload")]
    NoFields,

    #[error("Cannot convert field '{field}' value '{value}': {reason}")]
    Conversion {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Message filtered: field '{field}' has value '{value}'")]
    Filtered { field: String, value: Value },
}

impl ParseError {
    /// Check whether the message was dropped by a configured filter
    /// rather than for being malformed.
    pub fn is_filtered(&self) -> bool {
        matches!(self, ParseError::Filtered { .. })
    }
}

/// Mutable collaborators of one parse call.
pub struct ParseContext<'a> {
    /// Cumulative-counter totals.
    pub counters: &'a mut CounterState,
    /// Unit registry for unit overrides.
    pub units: &'a dyn UnitRegistry,
    /// Server arrival time, epoch seconds.
    pub arrival: f64,
}

/// Payload grammar implementation.
pub trait Parser: Send + Sync + fmt::Debug {
    /// Configuration name of the grammar.
    fn name(&self) -> &'static str;

    /// Pull raw `(key, value)` pairs out of a payload.
    fn extract(
        &self,
        rule: &TopicRule,
        topic: &str,
        payload: &[u8],
    ) -> Result<Vec<(String, Value)>, ParseError>;

    /// Parse a payload into a canonical record.
    fn parse(
        &self,
        rule: &TopicRule,
        topic: &str,
        payload: &[u8],
        ctx: &mut ParseContext<'_>,
    ) -> Result<CanonicalRecord, ParseError> {
        let pairs = self.extract(rule, topic, payload)?;
        process_fields(rule, pairs, ctx)
    }
}

/// Build the parser for a grammar.
pub fn parser_for(grammar: &PayloadGrammar) -> Box<dyn Parser> {
    match grammar {
        PayloadGrammar::FlatKeyword {
            delimiter,
            separator,
        } => Box::new(KeywordParser::new(delimiter, separator)),
        PayloadGrammar::StructuredNested { flatten_delimiter } => {
            Box::new(NestedParser::new(flatten_delimiter))
        }
        PayloadGrammar::SingleValue { use_topic_tail } => {
            Box::new(SingleValueParser::new(*use_topic_tail))
        }
    }
}

/// Decode a payload as UTF-8 text.
pub(crate) fn payload_text(payload: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(payload).map_err(|e| ParseError::Encoding(e.to_string()))
}

/// Unit system carried in the payload, if it is a known code.
fn payload_unit_system(raw: &Value) -> Option<UnitSystem> {
    let code = match raw {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
        Value::Text(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    UnitSystem::from_code(code)
}

/// Apply the shared field pipeline to raw pairs.
pub fn process_fields(
    rule: &TopicRule,
    pairs: Vec<(String, Value)>,
    ctx: &mut ParseContext<'_>,
) -> Result<CanonicalRecord, ParseError> {
    let mut raw_timestamp = None;
    let mut unit_system = rule.unit_system;
    let mut accepted: Vec<(String, Cow<'_, FieldRule>, Value)> = Vec::with_capacity(pairs.len());

    // Pass 1: ignore, convert, filter. May abort the message.
    for (key, raw) in pairs {
        if key == DATETIME_KEY {
            raw_timestamp = Some(raw);
            continue;
        }
        if key == US_UNITS_KEY {
            match payload_unit_system(&raw) {
                Some(system) => unit_system = system,
                None => tracing::warn!(
                    "Topic '{}': unknown {} value '{}', using {}",
                    rule.topic_pattern,
                    US_UNITS_KEY,
                    raw,
                    unit_system
                ),
            }
            continue;
        }

        let field_rule = rule.rule_for(&key);
        if field_rule.ignore {
            tracing::trace!("Topic '{}': ignoring field '{}'", rule.topic_pattern, key);
            continue;
        }

        let converted = match &field_rule.conversion {
            None => raw,
            Some(conversion) => match conversion.apply(&raw) {
                Ok(v) => v,
                Err(reason) => match field_rule.on_conversion_error {
                    ConversionErrorPolicy::Propagate => {
                        return Err(ParseError::Conversion {
                            field: key,
                            value: raw.to_string(),
                            reason,
                        })
                    }
                    ConversionErrorPolicy::NullValue => {
                        tracing::warn!(
                            "Topic '{}': field '{}' value '{}' not converted ({}), using None",
                            rule.topic_pattern,
                            key,
                            raw,
                            reason
                        );
                        Value::Null
                    }
                },
            },
        };

        if field_rule.is_filtered(&converted) {
            return Err(ParseError::Filtered {
                field: key,
                value: converted,
            });
        }
        accepted.push((key, field_rule, converted));
    }

    let timestamp = timestamp::resolve(rule, raw_timestamp.as_ref(), ctx.arrival)?;
    let mut record = CanonicalRecord::new(timestamp, unit_system);

    // Pass 2: units, counters, names.
    for (key, field_rule, value) in accepted {
        let mut value = value;
        if let Some(from) = field_rule.unit_override.as_deref() {
            value = convert_unit(ctx.units, unit_system, &field_rule.canonical_name, from, value);
        }
        if field_rule.is_cumulative_counter {
            if let Some(total) = value.as_f64().filter(|_| !matches!(value, Value::Bool(_))) {
                match ctx
                    .counters
                    .delta(&key, total, field_rule.counter_wraps_around)
                    .value()
                {
                    Some(delta) => value = Value::Float(delta),
                    None => continue,
                }
            }
        }
        record
            .fields
            .insert(field_rule.canonical_name.clone(), value);
    }
    Ok(record)
}

/// Convert `value` from `from` into the unit `measurement` uses in `system`.
fn convert_unit(
    units: &dyn UnitRegistry,
    system: UnitSystem,
    measurement: &str,
    from: &str,
    value: Value,
) -> Value {
    let Some(to) = units.units_for_measurement(system, measurement) else {
        return value;
    };
    if to == from {
        return value;
    }
    let Some(raw) = value.as_f64().filter(|_| !matches!(value, Value::Bool(_))) else {
        return value;
    };
    match units.convert(raw, from, to) {
        Some(converted) => Value::Float(converted),
        None => {
            tracing::warn!(
                "No conversion from '{}' to '{}' for '{}', keeping value",
                from,
                to,
                measurement
            );
            value
        }
    }
}
