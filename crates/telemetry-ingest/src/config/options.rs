// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed option blocks.
//!
//! Each layer merge produces a plain scalar table which is deserialized
//! into one of these structs. Option values may be native TOML values or
//! strings (`"true"`, `"60"`), and lists may be arrays or comma-separated
//! strings.

use super::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use toml::{Table, Value as TomlValue};

/// Deserialize a merged option table.
pub(crate) fn from_table<T: DeserializeOwned>(table: &Table, path: &str) -> Result<T, ConfigError> {
    TomlValue::Table(table.clone())
        .try_into()
        .map_err(|source| ConfigError::Options {
            path: path.to_string(),
            source,
        })
}

/// Topic options, also used for the `[topics]` defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct TopicScalars {
    #[serde(default = "default_unit_system", deserialize_with = "lenient::text")]
    pub unit_system: String,

    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub subscribe: bool,

    #[serde(default, deserialize_with = "lenient::count")]
    pub qos: u64,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub use_server_datetime: bool,

    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub datetime_format: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub offset_format: Option<String>,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub ignore_start_time: bool,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub ignore_end_time: bool,

    /// Seconds.
    #[serde(default, deserialize_with = "lenient::number")]
    pub adjust_start_time: f64,

    /// Seconds.
    #[serde(default, deserialize_with = "lenient::number")]
    pub adjust_end_time: f64,

    #[serde(default = "default_max_queue", deserialize_with = "lenient::count")]
    pub max_queue: u64,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub ignore: bool,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub contains_total: bool,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub wrap_around: bool,

    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub conversion_type: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub conversion_func: Option<String>,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub conversion_error_to_none: bool,

    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub msg_id_field: Option<String>,

    #[serde(default, deserialize_with = "lenient::list")]
    pub ignore_msg_id_field: Vec<String>,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub use_topic_as_fieldname: bool,
}

fn default_unit_system() -> String {
    "US".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_queue() -> u64 {
    i64::MAX as u64
}

/// Service-wide keys of the `[topics]` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ServiceBlock {
    #[serde(default, deserialize_with = "lenient::flag")]
    pub single_queue: bool,

    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub collect_wind_across_loops: bool,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub collect_observations: bool,

    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub time_reference_topic: Option<String>,

    #[serde(default, deserialize_with = "lenient::list")]
    pub collector_fields: Vec<String>,
}

/// Options of one field section. Unset options fall back to the topic.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct FieldOptions {
    #[serde(deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,

    #[serde(deserialize_with = "lenient::opt_flag")]
    pub ignore: Option<bool>,

    #[serde(deserialize_with = "lenient::opt_flag")]
    pub contains_total: Option<bool>,

    #[serde(deserialize_with = "lenient::opt_flag")]
    pub wrap_around: Option<bool>,

    #[serde(deserialize_with = "lenient::opt_text")]
    pub conversion_type: Option<String>,

    #[serde(deserialize_with = "lenient::opt_text")]
    pub conversion_func: Option<String>,

    #[serde(deserialize_with = "lenient::opt_flag")]
    pub conversion_error_to_none: Option<bool>,

    #[serde(deserialize_with = "lenient::opt_text")]
    pub units: Option<String>,

    /// Raw filter values; converted with the field's conversion.
    pub filter_out_message_when: Option<TomlValue>,

    /// Seconds.
    #[serde(deserialize_with = "lenient::opt_number")]
    pub expires_after: Option<f64>,

    /// Table of subfield sections, or a list of names.
    pub subfields: Option<TomlValue>,
}

/// A `[message]` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct MessageOptions {
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_text")]
    pub kind: Option<String>,

    #[serde(default = "default_flatten_delimiter", deserialize_with = "lenient::text")]
    pub flatten_delimiter: String,

    #[serde(default = "default_keyword_delimiter", deserialize_with = "lenient::text")]
    pub keyword_delimiter: String,

    #[serde(default = "default_keyword_separator", deserialize_with = "lenient::text")]
    pub keyword_separator: String,
}

fn default_flatten_delimiter() -> String {
    "_".to_string()
}

fn default_keyword_delimiter() -> String {
    ",".to_string()
}

fn default_keyword_separator() -> String {
    "=".to_string()
}

/// Text form of a scalar option value.
pub(crate) fn scalar_text(value: &TomlValue) -> Option<String> {
    match value {
        TomlValue::String(s) => Some(s.clone()),
        TomlValue::Integer(i) => Some(i.to_string()),
        TomlValue::Float(f) => Some(f.to_string()),
        TomlValue::Boolean(b) => Some(b.to_string()),
        TomlValue::Datetime(d) => Some(d.to_string()),
        TomlValue::Array(_) | TomlValue::Table(_) => None,
    }
}

/// A list option value: an array of scalars or a comma-separated string.
pub(crate) fn list_items(value: &TomlValue) -> Option<Vec<String>> {
    match value {
        TomlValue::Array(items) => items.iter().map(scalar_text).collect(),
        TomlValue::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        other => scalar_text(other).map(|s| vec![s]),
    }
}

/// Deserializers accepting native values or their string spellings.
mod lenient {
    use super::*;
    use crate::config::conversion::parse_bool;

    fn invalid<E: serde::de::Error>(value: &TomlValue) -> E {
        E::custom(format!("invalid value '{}'", value))
    }

    fn as_bool(value: &TomlValue) -> Option<bool> {
        match value {
            TomlValue::Boolean(b) => Some(*b),
            TomlValue::Integer(0) => Some(false),
            TomlValue::Integer(1) => Some(true),
            TomlValue::String(s) => parse_bool(s),
            _ => None,
        }
    }

    fn as_f64(value: &TomlValue) -> Option<f64> {
        match value {
            TomlValue::Float(f) => Some(*f),
            TomlValue::Integer(i) => Some(*i as f64),
            TomlValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_u64(value: &TomlValue) -> Option<u64> {
        match value {
            TomlValue::Integer(i) => u64::try_from(*i).ok(),
            TomlValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        let value = TomlValue::deserialize(d)?;
        as_bool(&value).ok_or_else(|| invalid(&value))
    }

    pub fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        flag(d).map(Some)
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = TomlValue::deserialize(d)?;
        as_f64(&value).ok_or_else(|| invalid(&value))
    }

    pub fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        number(d).map(Some)
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let value = TomlValue::deserialize(d)?;
        as_u64(&value).ok_or_else(|| invalid(&value))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let value = TomlValue::deserialize(d)?;
        scalar_text(&value).ok_or_else(|| invalid(&value))
    }

    /// Empty strings count as unset.
    pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        text(d).map(|s| Some(s).filter(|s| !s.is_empty()))
    }

    pub fn list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let value = TomlValue::deserialize(d)?;
        list_items(&value).ok_or_else(|| invalid(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> Table {
        toml::from_str(src).expect("parse")
    }

    #[test]
    fn test_topic_defaults() {
        let scalars: TopicScalars = from_table(&Table::new(), "topics").expect("defaults");
        assert_eq!(scalars.unit_system, "US");
        assert!(scalars.subscribe);
        assert_eq!(scalars.qos, 0);
        assert_eq!(scalars.max_queue, i64::MAX as u64);
        assert!(scalars.conversion_type.is_none());
        assert!(scalars.ignore_msg_id_field.is_empty());
    }

    #[test]
    fn test_values_accept_strings() {
        let scalars: TopicScalars = from_table(
            &table(
                r#"
subscribe = "no"
qos = "1"
adjust_start_time = "2.5"
max_queue = 60
ignore = 1
ignore_msg_id_field = "a, b,,c"
"#,
            ),
            "topics",
        )
        .expect("typed");
        assert!(!scalars.subscribe);
        assert_eq!(scalars.qos, 1);
        assert_eq!(scalars.adjust_start_time, 2.5);
        assert_eq!(scalars.max_queue, 60);
        assert!(scalars.ignore);
        assert_eq!(scalars.ignore_msg_id_field, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_of_mixed_scalars() {
        let service: ServiceBlock =
            from_table(&table("collector_fields = [\"x\", 2]"), "topics").expect("typed");
        assert_eq!(service.collector_fields, vec!["x", "2"]);
        assert!(service.collect_wind_across_loops);
    }

    #[test]
    fn test_field_options_unset_stay_none() {
        let options: FieldOptions =
            from_table(&table("name = \"rain\"\nexpires_after = \"300\""), "f").expect("typed");
        assert_eq!(options.name.as_deref(), Some("rain"));
        assert_eq!(options.expires_after, Some(300.0));
        assert!(options.ignore.is_none());
        assert!(options.subfields.is_none());
    }

    #[test]
    fn test_message_defaults() {
        let message: MessageOptions =
            from_table(&table("type = \"keyword\""), "message").expect("typed");
        assert_eq!(message.kind.as_deref(), Some("keyword"));
        assert_eq!(message.keyword_delimiter, ",");
        assert_eq!(message.keyword_separator, "=");
        assert_eq!(message.flatten_delimiter, "_");
    }

    #[test]
    fn test_garbage_rejected() {
        let result: Result<TopicScalars, _> =
            from_table(&table("subscribe = \"perhaps\""), "topics.\"a\"");
        assert!(matches!(result, Err(ConfigError::Options { path, .. }) if path == "topics.\"a\""));
        let result: Result<TopicScalars, _> = from_table(&table("max_queue = -3"), "topics");
        assert!(result.is_err());
    }
}
