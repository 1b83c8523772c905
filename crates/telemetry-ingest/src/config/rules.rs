// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fully resolved interpretation rules.
//!
//! These are the typed output of configuration resolution. They are
//! immutable once built and are shared by the parsers and the queue store.

use crate::config::conversion::Conversion;
use crate::queue::QueueHandle;
use crate::units::UnitSystem;
use crate::value::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// What to do when a field value fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionErrorPolicy {
    /// Abort the whole message.
    #[default]
    Propagate,
    /// Substitute `Null` and keep the message.
    NullValue,
}

/// Payload grammar of a topic, with its grammar-specific options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadGrammar {
    /// `key=value,key=value` lists.
    FlatKeyword {
        /// Separator between chunks.
        delimiter: String,
        /// Separator between key and value inside a chunk.
        separator: String,
    },
    /// Nested JSON documents.
    StructuredNested {
        /// Joins parent and child keys while flattening.
        flatten_delimiter: String,
    },
    /// The whole payload is one value.
    SingleValue {
        /// Use the last topic segment as the field key instead of the full topic.
        use_topic_tail: bool,
    },
}

impl PayloadGrammar {
    /// Configuration name of this grammar.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::FlatKeyword { .. } => "keyword",
            Self::StructuredNested { .. } => "json",
            Self::SingleValue { .. } => "individual",
        }
    }
}

/// Interpretation rule for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    /// Output field name.
    pub canonical_name: String,
    /// Drop this field from output.
    pub ignore: bool,
    /// The raw value is a running total.
    pub is_cumulative_counter: bool,
    /// A decreasing total means the counter was reset.
    pub counter_wraps_around: bool,
    /// Value coercion; `None` exactly when `subfield_names` is set.
    pub conversion: Option<Conversion>,
    /// Behavior on conversion failure.
    pub on_conversion_error: ConversionErrorPolicy,
    /// Unit of the raw value when it differs from the topic unit system.
    pub unit_override: Option<String>,
    /// Converted values that cause the whole message to be discarded.
    pub filter_values: Vec<Value>,
    /// Names for each array position, for array-valued fields.
    pub subfield_names: Option<Vec<String>>,
    /// Lifetime of this field in the record cache.
    pub cache_expiry: Option<Duration>,
}

impl FieldRule {
    /// Check whether a converted value triggers the message filter.
    pub fn is_filtered(&self, value: &Value) -> bool {
        self.filter_values.iter().any(|f| f == value)
    }
}

/// Topic-level defaults applied to fields without their own section.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefaults {
    pub ignore: bool,
    pub contains_total: bool,
    pub wrap_around: bool,
    pub conversion: Conversion,
    pub on_conversion_error: ConversionErrorPolicy,
}

impl FieldDefaults {
    /// Rule for an unconfigured field.
    pub fn rule(&self, key: &str) -> FieldRule {
        FieldRule {
            canonical_name: key.to_string(),
            ignore: self.ignore,
            is_cumulative_counter: self.contains_total,
            counter_wraps_around: self.wrap_around,
            conversion: Some(self.conversion.clone()),
            on_conversion_error: self.on_conversion_error,
            unit_override: None,
            filter_values: Vec::new(),
            subfield_names: None,
            cache_expiry: None,
        }
    }
}

/// Slack applied to window bounds during windowed reads.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowPolicy {
    /// Start the window at the oldest queued record instead of the caller bound.
    pub ignore_start: bool,
    /// End the window at the newest queued record instead of the caller bound.
    pub ignore_end: bool,
    /// Moved earlier from the start bound.
    pub adjust_start: Duration,
    /// Moved later from the end bound.
    pub adjust_end: Duration,
}

/// Interpretation rule for one subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRule {
    /// Topic name or wildcard pattern.
    pub topic_pattern: String,
    /// Subscribe to this topic at the transport.
    pub subscribe: bool,
    /// Transport quality of service (0..=2).
    pub qos: u8,
    /// Unit system of incoming values.
    pub unit_system: UnitSystem,
    /// Payload grammar.
    pub grammar: PayloadGrammar,
    /// Configured fields, keyed by source field key.
    pub fields: BTreeMap<String, FieldRule>,
    /// Defaults for fields without a section.
    pub field_defaults: FieldDefaults,
    /// Field whose value suffixes every other field key.
    pub msg_correlation_field: Option<String>,
    /// Keys that keep their plain name when a correlation field is set.
    pub fields_exempt_from_correlation_suffix: BTreeSet<String>,
    /// Ignore any payload-carried timestamp.
    pub use_server_clock: bool,
    /// `chrono` format of textual `dateTime` values.
    pub timestamp_format: Option<String>,
    /// `chrono` format of the offset appended to textual `dateTime` values.
    pub timestamp_offset_format: Option<String>,
    /// Window slack for windowed reads.
    pub window: WindowPolicy,
    /// Queue receiving this topic's records.
    pub queue: QueueHandle,
    /// Maximum depth of that queue.
    pub max_queue_depth: usize,
}

impl TopicRule {
    /// Rule for a field key: the configured one, or one built from defaults.
    pub fn rule_for(&self, key: &str) -> Cow<'_, FieldRule> {
        match self.fields.get(key) {
            Some(rule) => Cow::Borrowed(rule),
            None => Cow::Owned(self.field_defaults.rule(key)),
        }
    }

    /// Single-value topics keyed by the last topic segment.
    pub fn use_topic_tail_as_field_name(&self) -> bool {
        matches!(
            self.grammar,
            PayloadGrammar::SingleValue {
                use_topic_tail: true
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FieldDefaults {
        FieldDefaults {
            ignore: true,
            contains_total: false,
            wrap_around: false,
            conversion: Conversion::Float,
            on_conversion_error: ConversionErrorPolicy::NullValue,
        }
    }

    #[test]
    fn test_default_rule_carries_topic_defaults() {
        let rule = defaults().rule("outTemp");
        assert_eq!(rule.canonical_name, "outTemp");
        assert!(rule.ignore);
        assert_eq!(rule.conversion, Some(Conversion::Float));
        assert_eq!(rule.on_conversion_error, ConversionErrorPolicy::NullValue);
        assert!(rule.subfield_names.is_none());
    }

    #[test]
    fn test_filter_match_is_by_value() {
        let mut rule = defaults().rule("state");
        rule.filter_values = vec![Value::Text("OFF".into()), Value::Float(0.0)];
        assert!(rule.is_filtered(&Value::Text("OFF".into())));
        assert!(rule.is_filtered(&Value::Float(0.0)));
        assert!(!rule.is_filtered(&Value::Text("off".into())));
        assert!(!rule.is_filtered(&Value::Int(0)));
    }

    #[test]
    fn test_grammar_names() {
        let g = PayloadGrammar::SingleValue {
            use_topic_tail: true,
        };
        assert_eq!(g.kind_name(), "individual");
        assert_eq!(
            PayloadGrammar::StructuredNested {
                flatten_delimiter: "_".into()
            }
            .kind_name(),
            "json"
        );
    }
}
