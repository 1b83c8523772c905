// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Nested JSON payloads.
//!
//! Objects are flattened into `parent_child` keys. Arrays are only
//! accepted for fields with configured subfield names of the same
//! length; each element then takes its subfield name as key.

use super::{ParseError, Parser};
use crate::config::TopicRule;
use crate::record::{DATETIME_KEY, US_UNITS_KEY};
use crate::value::Value;
use serde_json::{Map, Value as JsonValue};

/// Parser for nested JSON documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedParser {
    flatten_delimiter: String,
}

impl NestedParser {
    /// Create a parser joining nested keys with `flatten_delimiter`.
    pub fn new(flatten_delimiter: &str) -> Self {
        Self {
            flatten_delimiter: flatten_delimiter.to_string(),
        }
    }

    fn flatten(
        &self,
        rule: &TopicRule,
        prefix: Option<&str>,
        object: &Map<String, JsonValue>,
        out: &mut Vec<(String, Value)>,
    ) {
        for (name, value) in object {
            let key = match prefix {
                Some(prefix) => format!("{}{}{}", prefix, self.flatten_delimiter, name),
                None => name.clone(),
            };
            self.add(rule, key, value, out);
        }
    }

    fn add(&self, rule: &TopicRule, key: String, value: &JsonValue, out: &mut Vec<(String, Value)>) {
        match value {
            JsonValue::Object(object) => self.flatten(rule, Some(&key), object, out),
            JsonValue::Array(items) => self.expand(rule, &key, items, out),
            scalar => {
                if let Some(v) = Value::from_json(scalar) {
                    out.push((key, v));
                }
            }
        }
    }

    fn expand(
        &self,
        rule: &TopicRule,
        key: &str,
        items: &[JsonValue],
        out: &mut Vec<(String, Value)>,
    ) {
        let names = rule
            .fields
            .get(key)
            .and_then(|field| field.subfield_names.as_ref());
        let Some(names) = names else {
            tracing::warn!(
                "Topic '{}': array field '{}' has no subfields configured, skipped",
                rule.topic_pattern,
                key
            );
            return;
        };
        if names.len() != items.len() {
            tracing::warn!(
                "Topic '{}': array field '{}' has {} elements but {} subfields, skipped",
                rule.topic_pattern,
                key,
                items.len(),
                names.len()
            );
            return;
        }
        for (name, item) in names.iter().zip(items) {
            self.add(rule, name.clone(), item, out);
        }
    }
}

/// Append the correlation value to every key but the exempt ones.
fn apply_correlation(rule: &TopicRule, pairs: Vec<(String, Value)>) -> Vec<(String, Value)> {
    let Some(field) = rule.msg_correlation_field.as_deref() else {
        return pairs;
    };
    let Some(suffix) = pairs
        .iter()
        .find(|(key, _)| key == field)
        .map(|(_, value)| value.to_string())
    else {
        tracing::warn!(
            "Topic '{}': correlation field '{}' missing from payload",
            rule.topic_pattern,
            field
        );
        return pairs;
    };
    pairs
        .into_iter()
        .map(|(key, value)| {
            let exempt = key == field
                || key == DATETIME_KEY
                || key == US_UNITS_KEY
                || rule.fields_exempt_from_correlation_suffix.contains(&key);
            if exempt {
                (key, value)
            } else {
                (format!("{}_{}", key, suffix), value)
            }
        })
        .collect()
}

impl Parser for NestedParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extract(
        &self,
        rule: &TopicRule,
        _topic: &str,
        payload: &[u8],
    ) -> Result<Vec<(String, Value)>, ParseError> {
        let document: JsonValue =
            serde_json::from_slice(payload).map_err(|e| ParseError::Malformed(e.to_string()))?;
        let JsonValue::Object(object) = document else {
            return Err(ParseError::NotAnObject);
        };
        let mut pairs = Vec::with_capacity(object.len());
        self.flatten(rule, None, &object, &mut pairs);
        Ok(apply_correlation(rule, pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionRegistry, Resolver};
    use crate::counter::CounterState;
    use crate::parser::ParseContext;
    use crate::record::CanonicalRecord;
    use crate::units::StandardUnits;
    use serde_json::json;

    fn rule(extra: &str) -> TopicRule {
        let src = format!("{}\n[topics.\"j\".message]\ntype = \"json\"\n", extra);
        let raw: toml::Table = toml::from_str(&src).expect("parse");
        let resolved = Resolver::new(&StandardUnits::new(), &ConversionRegistry::new())
            .resolve(&raw)
            .expect("resolve");
        resolved.topics["j"].clone()
    }

    fn parse(rule: &TopicRule, payload: serde_json::Value) -> Result<CanonicalRecord, ParseError> {
        let units = StandardUnits::new();
        let mut counters = CounterState::new();
        let mut ctx = ParseContext {
            counters: &mut counters,
            units: &units,
            arrival: 0.0,
        };
        let bytes = serde_json::to_vec(&payload).expect("encode");
        NestedParser::new("_").parse(rule, "j", &bytes, &mut ctx)
    }

    #[test]
    fn test_flatten() {
        let record = parse(&rule(""), json!({"a": {"b": 1, "c": 2}})).expect("parse");
        assert_eq!(record.get("a_b"), Some(&Value::Float(1.0)));
        assert_eq!(record.get("a_c"), Some(&Value::Float(2.0)));
        assert_eq!(record.fields.len(), 2);
    }

    #[test]
    fn test_array_subfields() {
        let rule = rule("[topics.\"j\".temps]\nsubfields = [\"t1\", \"t2\"]\n");
        let record = parse(&rule, json!({"temps": [1.1, 2.2]})).expect("parse");
        assert_eq!(record.get("t1"), Some(&Value::Float(1.1)));
        assert_eq!(record.get("t2"), Some(&Value::Float(2.2)));
        assert!(record.get("temps").is_none());
    }

    #[test]
    fn test_array_length_mismatch_skips_only_that_key() {
        let rule = rule("[topics.\"j\".temps]\nsubfields = [\"t1\", \"t2\"]\n");
        let record = parse(&rule, json!({"temps": [1.0, 2.0, 3.0], "hum": 40})).expect("parse");
        assert!(record.get("t1").is_none());
        assert_eq!(record.get("hum"), Some(&Value::Float(40.0)));
    }

    #[test]
    fn test_nested_arrays_use_subfield_prefix() {
        let rule = rule(
            "[topics.\"j\".sensors]\nsubfields = [\"p1\", \"p2\"]\n[topics.\"j\".p2]\nsubfields = [\"p2a\", \"p2b\"]\n",
        );
        let record = parse(
            &rule,
            json!({"sensors": [{"temp": 20}, [1, 2]]}),
        )
        .expect("parse");
        assert_eq!(record.get("p1_temp"), Some(&Value::Float(20.0)));
        assert_eq!(record.get("p2a"), Some(&Value::Float(1.0)));
        assert_eq!(record.get("p2b"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn test_correlation_suffix() {
        let rule = rule("[topics]\nmsg_id_field = \"id\"\nignore_msg_id_field = [\"battery\"]\n");
        let record = parse(
            &rule,
            json!({"id": 3, "temp": 20, "battery": 1}),
        )
        .expect("parse");
        assert_eq!(record.get("temp_3"), Some(&Value::Float(20.0)));
        assert_eq!(record.get("battery"), Some(&Value::Float(1.0)));
        assert_eq!(record.get("id"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_not_an_object() {
        assert_eq!(parse(&rule(""), json!([1, 2])), Err(ParseError::NotAnObject));
        let units = StandardUnits::new();
        let mut counters = CounterState::new();
        let mut ctx = ParseContext {
            counters: &mut counters,
            units: &units,
            arrival: 0.0,
        };
        let result = NestedParser::new("_").parse(&rule(""), "j", b"{not json", &mut ctx);
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }
}
