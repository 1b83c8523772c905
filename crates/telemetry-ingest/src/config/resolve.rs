// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration resolution.
//!
//! Turns the raw configuration tree into one [`TopicRule`] per topic plus
//! the synthetic collector rule. Topic options are merged from the
//! `[topics]` block and the topic section, then deserialized into typed
//! option blocks whose serde defaults stand in for the compiled-in
//! defaults. Field options fall back to the topic's field defaults.
//!
//! ```toml
//! [topics]
//! unit_system = "METRIC"
//! [topics.message]
//! type = "json"
//!
//! [topics."weather/loop"]
//! qos = 1
//! [topics."weather/loop".rain_total]
//! name = "rain"
//! contains_total = true
//! ```

use super::conversion::{Conversion, ConversionRegistry};
use super::options::{
    from_table, list_items, scalar_text, FieldOptions, MessageOptions, ServiceBlock, TopicScalars,
};
use super::rules::{
    ConversionErrorPolicy, FieldDefaults, FieldRule, PayloadGrammar, TopicRule, WindowPolicy,
};
use super::{merge_layers, ConfigError};
use crate::queue::{QueueHandle, QueueKind, QueueSpec};
use crate::units::{UnitRegistry, UnitSystem};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use toml::{Table, Value as TomlValue};

/// Name of the synthetic collector topic and queue.
pub const COLLECTOR_TOPIC: &str = "$collector";

/// Name of the queue shared by all topics in single-queue mode.
pub const SHARED_QUEUE: &str = "$shared";

/// Vector components correlated by the collector unless configured otherwise.
pub const DEFAULT_COLLECTOR_FIELDS: [&str; 4] = ["windDir", "windGust", "windGustDir", "windSpeed"];

const MESSAGE_KEY: &str = "message";
const LEGACY_MESSAGE_KEY: &str = "message_callback";

/// Options valid at topic level (and as global topic defaults).
const TOPIC_KEYS: &[&str] = &[
    "unit_system",
    "subscribe",
    "qos",
    "use_server_datetime",
    "datetime_format",
    "offset_format",
    "ignore_start_time",
    "ignore_end_time",
    "adjust_start_time",
    "adjust_end_time",
    "max_queue",
    "ignore",
    "contains_total",
    "wrap_around",
    "conversion_type",
    "conversion_func",
    "conversion_error_to_none",
    "msg_id_field",
    "ignore_msg_id_field",
    "use_topic_as_fieldname",
];

/// Service options valid only in the `[topics]` block.
const SERVICE_KEYS: &[&str] = &[
    "single_queue",
    "collect_wind_across_loops",
    "collect_observations",
    "time_reference_topic",
    "collector_fields",
];

const FIELD_KEYS: &[&str] = &[
    "name",
    "ignore",
    "contains_total",
    "wrap_around",
    "conversion_type",
    "conversion_func",
    "conversion_error_to_none",
    "units",
    "filter_out_message_when",
    "expires_after",
    "subfields",
];

const DEPRECATED_KEYS: &[(&str, &str)] = &[
    ("overlap", "use 'adjust_start_time' instead"),
    (
        "archive_topic",
        "name the topic with 'time_reference_topic' in [topics] instead",
    ),
    (
        "full_topic_fieldname",
        "use 'use_topic_as_fieldname' (inverted meaning) in the topic section instead",
    ),
    (
        "wind_fields",
        "use 'collector_fields' in [topics] instead",
    ),
];

/// Service-wide options from the `[topics]` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Queue every topic on one shared queue.
    pub single_queue: bool,
    /// Keep partially collected vectors across windowed reads.
    pub collect_wind_across_loops: bool,
    /// Merge every record of a drained window into one record.
    pub collect_observations: bool,
    /// Topic that keeps a private queue in single-queue mode.
    pub time_reference_topic: Option<String>,
}

/// Output of configuration resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// One rule per configured topic.
    pub topics: BTreeMap<String, TopicRule>,
    /// Rule of the synthetic collector topic.
    pub collector: TopicRule,
    /// Canonical field names taking part in the record cache.
    pub cached_fields: BTreeMap<String, Duration>,
    /// Queues to create, indexed by [`QueueHandle`].
    pub queues: Vec<QueueSpec>,
    /// Service-wide options.
    pub options: ServiceOptions,
    /// Non-fatal notices raised while resolving.
    pub warnings: Vec<String>,
}

impl ResolvedConfig {
    /// Canonical names the collector correlates.
    pub fn collector_fields(&self) -> BTreeSet<String> {
        self.collector
            .fields
            .values()
            .map(|rule| rule.canonical_name.clone())
            .collect()
    }
}

/// Resolves raw configuration trees against unit and conversion registries.
pub struct Resolver<'a> {
    units: &'a dyn UnitRegistry,
    conversions: &'a ConversionRegistry,
}

/// Mutable state threaded through one resolution.
#[derive(Default)]
struct Pass {
    queues: Vec<QueueSpec>,
    shared_queue: Option<QueueHandle>,
    warnings: Vec<String>,
    legacy_warned: bool,
}

impl Pass {
    fn add_queue(&mut self, name: &str, max_depth: usize, kind: QueueKind) -> QueueHandle {
        let handle = QueueHandle::new(self.queues.len());
        self.queues.push(QueueSpec {
            name: name.to_string(),
            max_depth,
            kind,
        });
        handle
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Message blocks visible to every topic.
struct SharedMessages<'t> {
    global: &'t Table,
    legacy: &'t Table,
}

impl<'a> Resolver<'a> {
    /// Create a resolver.
    pub fn new(units: &'a dyn UnitRegistry, conversions: &'a ConversionRegistry) -> Self {
        Self { units, conversions }
    }

    /// Resolve a raw configuration tree.
    pub fn resolve(&self, raw: &Table) -> Result<ResolvedConfig, ConfigError> {
        check_deprecated(raw, "root")?;

        let topics_block = match raw.get("topics") {
            Some(TomlValue::Table(t)) => t,
            _ => return Err(ConfigError::NoTopics),
        };
        let empty = Table::new();
        let messages = SharedMessages {
            global: match topics_block.get(MESSAGE_KEY) {
                Some(TomlValue::Table(t)) => t,
                _ => &empty,
            },
            legacy: match raw.get(LEGACY_MESSAGE_KEY) {
                Some(TomlValue::Table(t)) => t,
                _ => &empty,
            },
        };

        let topic_sections: Vec<(&String, &Table)> = topics_block
            .iter()
            .filter(|(key, _)| key.as_str() != MESSAGE_KEY)
            .filter_map(|(key, value)| value.as_table().map(|t| (key, t)))
            .collect();
        if topic_sections.is_empty() {
            return Err(ConfigError::NoTopics);
        }

        let mut pass = Pass::default();

        let mut global_layer = Table::new();
        let mut service_layer = Table::new();
        for (key, value) in topics_block.iter().filter(|(_, v)| !v.is_table()) {
            if TOPIC_KEYS.contains(&key.as_str()) {
                global_layer.insert(key.clone(), value.clone());
            } else if SERVICE_KEYS.contains(&key.as_str()) {
                service_layer.insert(key.clone(), value.clone());
            } else {
                pass.warn(format!("Unknown option '{}' in [topics] ignored", key));
            }
        }

        let service: ServiceBlock = from_table(&service_layer, "topics")?;
        let options = ServiceOptions {
            single_queue: service.single_queue,
            collect_wind_across_loops: service.collect_wind_across_loops,
            collect_observations: service.collect_observations,
            time_reference_topic: service.time_reference_topic.clone(),
        };
        let global: TopicScalars = from_table(&global_layer, "topics")?;
        let global_max_queue = max_queue(&global)?;

        let mut topics = BTreeMap::new();
        let mut cached_fields = BTreeMap::new();

        for (name, section) in topic_sections {
            let rule = self.resolve_topic(
                name,
                section,
                &global_layer,
                &messages,
                &options,
                global_max_queue,
                &mut pass,
            )?;
            for field in rule.fields.values() {
                if let Some(expiry) = field.cache_expiry {
                    cached_fields.insert(field.canonical_name.clone(), expiry);
                }
            }
            topics.insert(name.clone(), rule);
        }

        if let Some(reference) = &options.time_reference_topic {
            if !topics.contains_key(reference) {
                return Err(ConfigError::UnknownTimeReference(reference.clone()));
            }
        }

        let collector_names = if service.collector_fields.is_empty() {
            DEFAULT_COLLECTOR_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            service.collector_fields
        };
        let collector = self.collector_rule(&global, &collector_names, global_max_queue, &mut pass)?;

        Ok(ResolvedConfig {
            topics,
            collector,
            cached_fields,
            queues: pass.queues,
            options,
            warnings: pass.warnings,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_topic(
        &self,
        name: &str,
        section: &Table,
        global_layer: &Table,
        messages: &SharedMessages<'_>,
        options: &ServiceOptions,
        global_max_queue: usize,
        pass: &mut Pass,
    ) -> Result<TopicRule, ConfigError> {
        let mut topic_layer = Table::new();
        let mut shorthand = Table::new();
        for (key, value) in section.iter().filter(|(_, v)| !v.is_table()) {
            if TOPIC_KEYS.contains(&key.as_str()) {
                topic_layer.insert(key.clone(), value.clone());
            } else {
                shorthand.insert(key.clone(), value.clone());
            }
        }
        let scalars: TopicScalars = from_table(
            &merge_layers(&[global_layer, &topic_layer]),
            &format!("topics.\"{}\"", name),
        )?;

        let unit_system = self.unit_system(name, &scalars.unit_system)?;

        if scalars.qos > 2 {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.qos", name),
                value: scalars.qos.to_string(),
            });
        }

        let topic_message = match section.get(MESSAGE_KEY) {
            Some(TomlValue::Table(t)) => t.clone(),
            _ => Table::new(),
        };
        let grammar = self.grammar(
            name,
            messages,
            &topic_message,
            scalars.use_topic_as_fieldname,
            pass,
        )?;

        let field_defaults = self.field_defaults(name, &scalars)?;

        let mut fields = BTreeMap::new();
        if !shorthand.is_empty() {
            // Field options directly under the topic: the topic is the field.
            self.build_field(name, name, &shorthand, &field_defaults, None, &mut fields, pass)?;
        }
        for (key, value) in section.iter() {
            if key == MESSAGE_KEY {
                continue;
            }
            if let TomlValue::Table(field_section) = value {
                self.build_field(name, key, field_section, &field_defaults, None, &mut fields, pass)?;
            }
        }

        let max_queue_depth = max_queue(&scalars)?;
        let private = !options.single_queue
            || options.time_reference_topic.as_deref() == Some(name);
        let queue = if private {
            pass.add_queue(name, max_queue_depth, QueueKind::Normal)
        } else if let Some(shared) = pass.shared_queue {
            shared
        } else {
            let shared = pass.add_queue(SHARED_QUEUE, global_max_queue, QueueKind::Normal);
            pass.shared_queue = Some(shared);
            shared
        };

        Ok(TopicRule {
            topic_pattern: name.to_string(),
            subscribe: scalars.subscribe,
            qos: scalars.qos as u8,
            unit_system,
            grammar,
            fields,
            field_defaults,
            window: window_policy(&scalars)?,
            msg_correlation_field: scalars.msg_id_field,
            fields_exempt_from_correlation_suffix: scalars
                .ignore_msg_id_field
                .into_iter()
                .collect(),
            use_server_clock: scalars.use_server_datetime,
            timestamp_format: scalars.datetime_format,
            timestamp_offset_format: scalars.offset_format,
            queue,
            max_queue_depth: if private { max_queue_depth } else { global_max_queue },
        })
    }

    fn unit_system(&self, topic: &str, name: &str) -> Result<UnitSystem, ConfigError> {
        let known = self.units.known_unit_systems();
        UnitSystem::parse(name)
            .filter(|_| known.iter().any(|k| *k == name))
            .ok_or_else(|| ConfigError::UnknownUnitSystem {
                topic: topic.to_string(),
                name: name.to_string(),
            })
    }

    fn grammar(
        &self,
        topic: &str,
        messages: &SharedMessages<'_>,
        topic_message: &Table,
        use_topic_tail: bool,
        pass: &mut Pass,
    ) -> Result<PayloadGrammar, ConfigError> {
        let has_new_style = !messages.global.is_empty() || !topic_message.is_empty();

        let merged = if has_new_style {
            if !messages.legacy.is_empty() && !pass.legacy_warned {
                pass.legacy_warned = true;
                pass.warn(format!(
                    "Both [{}] and per-topic [message] blocks are configured; [{}] is ignored",
                    LEGACY_MESSAGE_KEY, LEGACY_MESSAGE_KEY
                ));
            }
            merge_layers(&[messages.global, topic_message])
        } else if !messages.legacy.is_empty() {
            messages.legacy.clone()
        } else {
            return Err(ConfigError::MissingGrammar(topic.to_string()));
        };
        let message: MessageOptions =
            from_table(&merged, &format!("topics.\"{}\".{}", topic, MESSAGE_KEY))?;

        let kind = message
            .kind
            .ok_or_else(|| ConfigError::MissingGrammar(topic.to_string()))?;

        match kind.to_ascii_lowercase().as_str() {
            "keyword" => Ok(PayloadGrammar::FlatKeyword {
                delimiter: message.keyword_delimiter,
                separator: message.keyword_separator,
            }),
            "json" => Ok(PayloadGrammar::StructuredNested {
                flatten_delimiter: message.flatten_delimiter,
            }),
            "individual" => Ok(PayloadGrammar::SingleValue { use_topic_tail }),
            _ => Err(ConfigError::UnknownGrammar {
                topic: topic.to_string(),
                kind,
            }),
        }
    }

    fn conversion(
        &self,
        field: &str,
        func: Option<&str>,
        kind: Option<&str>,
    ) -> Result<Option<Conversion>, ConfigError> {
        if let Some(func) = func {
            return self
                .conversions
                .get(func)
                .map(Some)
                .ok_or_else(|| ConfigError::UnknownConversion {
                    field: field.to_string(),
                    name: func.to_string(),
                });
        }
        match kind {
            None => Ok(None),
            Some(kind) => Conversion::parse(kind)
                .map(Some)
                .ok_or_else(|| ConfigError::UnknownConversion {
                    field: field.to_string(),
                    name: kind.to_string(),
                }),
        }
    }

    fn field_defaults(
        &self,
        topic: &str,
        scalars: &TopicScalars,
    ) -> Result<FieldDefaults, ConfigError> {
        let conversion = self
            .conversion(
                topic,
                scalars.conversion_func.as_deref(),
                scalars.conversion_type.as_deref(),
            )?
            .unwrap_or(Conversion::Float);
        Ok(FieldDefaults {
            ignore: scalars.ignore,
            contains_total: scalars.contains_total,
            wrap_around: scalars.wrap_around,
            conversion,
            on_conversion_error: error_policy(scalars.conversion_error_to_none),
        })
    }

    /// Build the rule for `key` (and its subfields) into `out`.
    #[allow(clippy::too_many_arguments)]
    fn build_field(
        &self,
        topic: &str,
        key: &str,
        section: &Table,
        defaults: &FieldDefaults,
        inherited_units: Option<&str>,
        out: &mut BTreeMap<String, FieldRule>,
        pass: &mut Pass,
    ) -> Result<(), ConfigError> {
        for option in section.keys() {
            if !FIELD_KEYS.contains(&option.as_str()) {
                pass.warn(format!(
                    "Unknown option '{}' for field '{}' of topic '{}' ignored",
                    option, key, topic
                ));
            }
        }

        let own: FieldOptions = from_table(section, &format!("topics.\"{}\".{}", topic, key))?;

        let units = own.units.or_else(|| inherited_units.map(str::to_string));
        if let Some(unit) = &units {
            if !self.units.is_known_unit(unit) {
                return Err(ConfigError::UnknownUnit {
                    topic: topic.to_string(),
                    field: key.to_string(),
                    unit: unit.clone(),
                });
            }
        }

        let subfields = subfield_sections(key, own.subfields.as_ref())?;

        // The field's own conversion settings take precedence over the topic's.
        let conversion = match subfields {
            Some(_) => None,
            None => self
                .conversion(
                    key,
                    own.conversion_func.as_deref(),
                    own.conversion_type.as_deref(),
                )?
                .or_else(|| Some(defaults.conversion.clone())),
        };

        let ignore = own.ignore.unwrap_or(defaults.ignore);

        let mut filter_values = Vec::new();
        if let Some(raw_filters) = &own.filter_out_message_when {
            if ignore {
                pass.warn(format!(
                    "Field '{}' of topic '{}' is ignored; its filter_out_message_when has no effect",
                    key, topic
                ));
            }
            let conversion = conversion.clone().unwrap_or(Conversion::Raw);
            for raw in filter_items(raw_filters) {
                let converted =
                    conversion
                        .apply(&raw)
                        .map_err(|_| ConfigError::InvalidValue {
                            key: format!("{}.filter_out_message_when", key),
                            value: raw.to_string(),
                        })?;
                filter_values.push(converted);
            }
        }

        let cache_expiry = own
            .expires_after
            .map(|secs| seconds(&format!("{}.expires_after", key), secs))
            .transpose()?;

        let subfield_names = match subfields {
            Some(entries) => {
                let mut names = Vec::with_capacity(entries.len());
                for (sub_name, sub_section) in entries {
                    self.build_field(
                        topic,
                        &sub_name,
                        &sub_section,
                        defaults,
                        units.as_deref(),
                        out,
                        pass,
                    )?;
                    names.push(sub_name);
                }
                Some(names)
            }
            None => None,
        };

        let rule = FieldRule {
            canonical_name: own.name.unwrap_or_else(|| key.to_string()),
            ignore,
            is_cumulative_counter: own.contains_total.unwrap_or(defaults.contains_total),
            counter_wraps_around: own.wrap_around.unwrap_or(defaults.wrap_around),
            conversion,
            on_conversion_error: own
                .conversion_error_to_none
                .map(error_policy)
                .unwrap_or(defaults.on_conversion_error),
            unit_override: units,
            filter_values,
            subfield_names,
            cache_expiry,
        };
        out.insert(key.to_string(), rule);
        Ok(())
    }

    fn collector_rule(
        &self,
        global: &TopicScalars,
        names: &[String],
        max_depth: usize,
        pass: &mut Pass,
    ) -> Result<TopicRule, ConfigError> {
        let unit_system = self.unit_system(COLLECTOR_TOPIC, &global.unit_system)?;
        let field_defaults = self.field_defaults(COLLECTOR_TOPIC, global)?;
        let fields = names
            .iter()
            .map(|name| (name.clone(), field_defaults.rule(name)))
            .collect();
        let queue = pass.add_queue(COLLECTOR_TOPIC, max_depth, QueueKind::Collector);

        Ok(TopicRule {
            topic_pattern: COLLECTOR_TOPIC.to_string(),
            subscribe: false,
            qos: 0,
            unit_system,
            // Never parsed; records reach the collector already canonical.
            grammar: PayloadGrammar::StructuredNested {
                flatten_delimiter: "_".to_string(),
            },
            fields,
            field_defaults,
            msg_correlation_field: None,
            fields_exempt_from_correlation_suffix: BTreeSet::new(),
            use_server_clock: false,
            timestamp_format: None,
            timestamp_offset_format: None,
            window: window_policy(global)?,
            queue,
            max_queue_depth: max_depth,
        })
    }
}

fn max_queue(scalars: &TopicScalars) -> Result<usize, ConfigError> {
    if scalars.max_queue == 0 {
        return Err(ConfigError::InvalidValue {
            key: "max_queue".to_string(),
            value: "0".to_string(),
        });
    }
    Ok(usize::try_from(scalars.max_queue).unwrap_or(usize::MAX))
}

fn error_policy(to_none: bool) -> ConversionErrorPolicy {
    if to_none {
        ConversionErrorPolicy::NullValue
    } else {
        ConversionErrorPolicy::Propagate
    }
}

/// A non-negative duration in seconds that fits in a [`Duration`].
fn seconds(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    if secs < 0.0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: secs.to_string(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: secs.to_string(),
    })
}

fn window_policy(scalars: &TopicScalars) -> Result<WindowPolicy, ConfigError> {
    Ok(WindowPolicy {
        ignore_start: scalars.ignore_start_time,
        ignore_end: scalars.ignore_end_time,
        adjust_start: seconds("adjust_start_time", scalars.adjust_start_time)?,
        adjust_end: seconds("adjust_end_time", scalars.adjust_end_time)?,
    })
}

/// Subfield entries in declaration order: a table of tables, or a list of names.
fn subfield_sections(
    key: &str,
    value: Option<&TomlValue>,
) -> Result<Option<Vec<(String, Table)>>, ConfigError> {
    match value {
        None => Ok(None),
        Some(TomlValue::Table(entries)) => entries
            .iter()
            .map(|(name, section)| match section {
                TomlValue::Table(t) => Ok((name.clone(), t.clone())),
                other => Err(ConfigError::InvalidValue {
                    key: format!("{}.subfields.{}", key, name),
                    value: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => {
            let names = list_items(other).ok_or_else(|| ConfigError::InvalidValue {
                key: format!("{}.subfields", key),
                value: other.to_string(),
            })?;
            Ok(Some(names.into_iter().map(|n| (n, Table::new())).collect()))
        }
    }
}

/// Filter values as raw observation values.
fn filter_items(value: &TomlValue) -> Vec<Value> {
    let raw = |v: &TomlValue| match v {
        TomlValue::Integer(i) => Value::Int(*i),
        TomlValue::Float(f) => Value::Float(*f),
        TomlValue::Boolean(b) => Value::Bool(*b),
        other => Value::Text(scalar_text(other).unwrap_or_default()),
    };
    match value {
        TomlValue::Array(items) => items.iter().map(raw).collect(),
        TomlValue::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .collect(),
        other => vec![raw(other)],
    }
}

fn check_deprecated(table: &Table, path: &str) -> Result<(), ConfigError> {
    for (key, value) in table.iter() {
        if let Some((_, hint)) = DEPRECATED_KEYS.iter().find(|(k, _)| *k == key.as_str()) {
            return Err(ConfigError::Deprecated {
                key: key.clone(),
                path: path.to_string(),
                hint: *hint,
            });
        }
        if let TomlValue::Table(child) = value {
            check_deprecated(child, &format!("{}.{}", path, key))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::StandardUnits;

    fn resolve(src: &str) -> Result<ResolvedConfig, ConfigError> {
        let raw: Table = toml::from_str(src).expect("parse");
        let units = StandardUnits::new();
        let conversions = ConversionRegistry::new();
        Resolver::new(&units, &conversions).resolve(&raw)
    }

    const BASIC: &str = r#"
[topics]
unit_system = "METRIC"
max_queue = 50
[topics.message]
type = "json"

[topics."weather/loop"]
qos = 1
ignore = true
[topics."weather/loop".outTemp]
ignore = false
units = "degree_F"
[topics."weather/loop".rain_total]
name = "rain"
ignore = false
contains_total = true
expires_after = 300

[topics."weather/kw"]
unit_system = "US"
[topics."weather/kw".message]
type = "keyword"
keyword_delimiter = ";"
"#;

    #[test]
    fn test_basic_resolution() {
        let resolved = resolve(BASIC).expect("resolve");
        assert_eq!(resolved.topics.len(), 2);

        let loop_rule = &resolved.topics["weather/loop"];
        assert_eq!(loop_rule.qos, 1);
        assert_eq!(loop_rule.unit_system, UnitSystem::Metric);
        assert!(loop_rule.field_defaults.ignore);
        assert_eq!(loop_rule.max_queue_depth, 50);
        assert_eq!(
            loop_rule.grammar,
            PayloadGrammar::StructuredNested {
                flatten_delimiter: "_".into()
            }
        );
        let out_temp = &loop_rule.fields["outTemp"];
        assert!(!out_temp.ignore);
        assert_eq!(out_temp.unit_override.as_deref(), Some("degree_F"));
        let rain = &loop_rule.fields["rain_total"];
        assert_eq!(rain.canonical_name, "rain");
        assert!(rain.is_cumulative_counter);
        assert_eq!(
            resolved.cached_fields.get("rain"),
            Some(&Duration::from_secs(300))
        );

        let kw = &resolved.topics["weather/kw"];
        assert_eq!(kw.unit_system, UnitSystem::Us);
        assert_eq!(
            kw.grammar,
            PayloadGrammar::FlatKeyword {
                delimiter: ";".into(),
                separator: "=".into()
            }
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        assert_eq!(resolve(BASIC).expect("first"), resolve(BASIC).expect("second"));
    }

    #[test]
    fn test_collector_always_created() {
        let resolved = resolve(BASIC).expect("resolve");
        assert!(!resolved.collector.subscribe);
        let names = resolved.collector_fields();
        for name in DEFAULT_COLLECTOR_FIELDS {
            assert!(names.contains(name));
        }
        let spec = &resolved.queues[resolved.collector.queue.index()];
        assert_eq!(spec.kind, QueueKind::Collector);
        assert_eq!(spec.name, COLLECTOR_TOPIC);
    }

    #[test]
    fn test_no_topics() {
        assert!(matches!(resolve(""), Err(ConfigError::NoTopics)));
        assert!(matches!(
            resolve("[topics]\nunit_system = \"US\""),
            Err(ConfigError::NoTopics)
        ));
    }

    #[test]
    fn test_missing_grammar_fails_closed() {
        let result = resolve("[topics.\"a/b\"]\nqos = 0");
        assert!(matches!(result, Err(ConfigError::MissingGrammar(t)) if t == "a/b"));
    }

    #[test]
    fn test_unknown_grammar() {
        let result = resolve("[topics.\"a/b\".message]\ntype = \"xml\"");
        assert!(matches!(result, Err(ConfigError::UnknownGrammar { .. })));
    }

    #[test]
    fn test_unknown_unit_system() {
        let result = resolve(
            "[topics.\"a/b\"]\nunit_system = \"IMPERIAL\"\n[topics.\"a/b\".message]\ntype = \"json\"",
        );
        assert!(matches!(result, Err(ConfigError::UnknownUnitSystem { .. })));
    }

    #[test]
    fn test_unknown_unit() {
        let result = resolve(
            r#"
[topics."a/b".message]
type = "json"
[topics."a/b".outTemp]
units = "degree_K"
"#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownUnit { unit, .. }) if unit == "degree_K"));
    }

    #[test]
    fn test_deprecated_option() {
        let result = resolve(
            r#"
[topics]
overlap = 30
[topics."a/b".message]
type = "json"
"#,
        );
        match result {
            Err(ConfigError::Deprecated { key, hint, .. }) => {
                assert_eq!(key, "overlap");
                assert!(hint.contains("adjust_start_time"));
            }
            other => panic!("expected Deprecated, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_message_block_shadowed_with_warning() {
        let resolved = resolve(
            r#"
[message_callback]
type = "keyword"

[topics."a/b".message]
type = "json"
"#,
        )
        .expect("resolve");
        assert!(matches!(
            resolved.topics["a/b"].grammar,
            PayloadGrammar::StructuredNested { .. }
        ));
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("message_callback"));
    }

    #[test]
    fn test_legacy_message_block_used_alone() {
        let resolved = resolve(
            r#"
[message_callback]
type = "keyword"
keyword_separator = ":"

[topics."a/b"]
qos = 0
"#,
        )
        .expect("resolve");
        assert_eq!(
            resolved.topics["a/b"].grammar,
            PayloadGrammar::FlatKeyword {
                delimiter: ",".into(),
                separator: ":".into()
            }
        );
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn test_single_value_shorthand() {
        let resolved = resolve(
            r#"
[topics."weather/outTemp"]
name = "outTemp"
units = "degree_C"
[topics."weather/outTemp".message]
type = "individual"
"#,
        )
        .expect("resolve");
        let rule = &resolved.topics["weather/outTemp"];
        let field = &rule.fields["weather/outTemp"];
        assert_eq!(field.canonical_name, "outTemp");
        assert_eq!(field.unit_override.as_deref(), Some("degree_C"));
        assert!(!rule.use_topic_tail_as_field_name());
    }

    #[test]
    fn test_topic_tail_option() {
        let resolved = resolve(
            r#"
[topics."weather/+"]
use_topic_as_fieldname = true
[topics."weather/+".message]
type = "individual"
"#,
        )
        .expect("resolve");
        assert!(resolved.topics["weather/+"].use_topic_tail_as_field_name());
    }

    #[test]
    fn test_subfields_expand_in_order() {
        let resolved = resolve(
            r#"
[topics."a/b".message]
type = "json"
[topics."a/b".temps]
units = "degree_C"
[topics."a/b".temps.subfields.t_zeta]
[topics."a/b".temps.subfields.t_alpha]
conversion_type = "int"
"#,
        )
        .expect("resolve");
        let rule = &resolved.topics["a/b"];
        let parent = &rule.fields["temps"];
        assert_eq!(
            parent.subfield_names,
            Some(vec!["t_zeta".to_string(), "t_alpha".to_string()])
        );
        assert!(parent.conversion.is_none());
        let zeta = &rule.fields["t_zeta"];
        assert_eq!(zeta.unit_override.as_deref(), Some("degree_C"));
        assert_eq!(zeta.conversion, Some(Conversion::Float));
        let alpha = &rule.fields["t_alpha"];
        assert_eq!(alpha.conversion, Some(Conversion::Int));
        assert_eq!(alpha.unit_override.as_deref(), Some("degree_C"));
    }

    #[test]
    fn test_subfields_as_list() {
        let resolved = resolve(
            r#"
[topics."a/b".message]
type = "json"
[topics."a/b".temps]
subfields = ["t1", "t2"]
"#,
        )
        .expect("resolve");
        let rule = &resolved.topics["a/b"];
        assert_eq!(
            rule.fields["temps"].subfield_names,
            Some(vec!["t1".to_string(), "t2".to_string()])
        );
        assert!(rule.fields.contains_key("t1"));
        assert!(rule.fields.contains_key("t2"));
    }

    #[test]
    fn test_filter_values_preconverted() {
        let resolved = resolve(
            r#"
[topics."a/b".message]
type = "json"
[topics."a/b".status]
conversion_type = "string"
filter_out_message_when = ["OFF"]
[topics."a/b".level]
filter_out_message_when = ["0", "-1"]
"#,
        )
        .expect("resolve");
        let rule = &resolved.topics["a/b"];
        assert_eq!(
            rule.fields["status"].filter_values,
            vec![Value::Text("OFF".into())]
        );
        assert_eq!(
            rule.fields["level"].filter_values,
            vec![Value::Float(0.0), Value::Float(-1.0)]
        );
    }

    #[test]
    fn test_filter_value_not_convertible() {
        let result = resolve(
            r#"
[topics."a/b".message]
type = "json"
[topics."a/b".level]
filter_out_message_when = ["OFF"]
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_single_queue_keeps_time_reference_private() {
        let resolved = resolve(
            r#"
[topics]
single_queue = true
time_reference_topic = "archive"
[topics.message]
type = "json"
[topics."a"]
qos = 0
[topics."b"]
qos = 0
[topics."archive"]
qos = 0
"#,
        )
        .expect("resolve");
        let a = resolved.topics["a"].queue;
        let b = resolved.topics["b"].queue;
        let archive = resolved.topics["archive"].queue;
        assert_eq!(a, b);
        assert_ne!(a, archive);
        assert_eq!(resolved.queues[a.index()].name, SHARED_QUEUE);
        assert_eq!(resolved.queues[archive.index()].name, "archive");
    }

    #[test]
    fn test_unknown_time_reference() {
        let result = resolve(
            r#"
[topics]
time_reference_topic = "nope"
[topics."a".message]
type = "json"
"#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownTimeReference(t)) if t == "nope"));
    }

    #[test]
    fn test_custom_conversion_lookup() {
        let raw: Table = toml::from_str(
            r#"
[topics."a".message]
type = "json"
[topics."a".rssi]
conversion_func = "negate"
[topics."a".other]
conversion_func = "missing"
"#,
        )
        .expect("parse");
        let units = StandardUnits::new();
        let conversions = ConversionRegistry::new().with("negate", |v: &Value| {
            v.as_f64()
                .map(|f| Value::Float(-f))
                .ok_or_else(|| "not numeric".to_string())
        });
        let result = Resolver::new(&units, &conversions).resolve(&raw);
        assert!(matches!(result, Err(ConfigError::UnknownConversion { name, .. }) if name == "missing"));
    }

    #[test]
    fn test_window_policy() {
        let resolved = resolve(
            r#"
[topics]
adjust_start_time = 2.5
[topics."a"]
ignore_end_time = true
adjust_end_time = "1"
[topics."a".message]
type = "json"
"#,
        )
        .expect("resolve");
        let window = resolved.topics["a"].window;
        assert!(!window.ignore_start);
        assert!(window.ignore_end);
        assert_eq!(window.adjust_start, Duration::from_millis(2500));
        assert_eq!(window.adjust_end, Duration::from_secs(1));
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let result = resolve(
            r#"
[topics."a".message]
type = "json"
[topics."a".outTemp]
expires_after = 1e300
"#,
        );
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "outTemp.expires_after")
        );

        let result = resolve(
            r#"
[topics]
adjust_start_time = 1e300
[topics."a".message]
type = "json"
"#,
        );
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "adjust_start_time")
        );

        let result = resolve(
            r#"
[topics."a"]
adjust_end_time = -5
[topics."a".message]
type = "json"
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_option_reports_path() {
        let result = resolve(
            r#"
[topics."a"]
subscribe = "sometimes"
[topics."a".message]
type = "json"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Options { path, .. }) if path == "topics.\"a\""));
    }

    #[test]
    fn test_filter_on_ignored_field_warns() {
        let resolved = resolve(
            r#"
[topics."a/b"]
ignore = true
[topics."a/b".message]
type = "json"
[topics."a/b".status]
conversion_type = "string"
filter_out_message_when = ["OFF"]
"#,
        )
        .expect("resolve");
        let status = &resolved.topics["a/b"].fields["status"];
        assert!(status.ignore);
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("status"));
    }

    #[test]
    fn test_field_overrides_topic_defaults() {
        let resolved = resolve(
            r#"
[topics."a"]
contains_total = true
conversion_error_to_none = true
conversion_type = "int"
[topics."a".message]
type = "json"
[topics."a".level]
contains_total = false
conversion_type = "string"
[topics."a".count]
"#,
        )
        .expect("resolve");
        let rule = &resolved.topics["a"];
        let level = &rule.fields["level"];
        assert!(!level.is_cumulative_counter);
        assert_eq!(level.conversion, Some(Conversion::Raw));
        assert_eq!(level.on_conversion_error, ConversionErrorPolicy::NullValue);
        let count = &rule.fields["count"];
        assert!(count.is_cumulative_counter);
        assert_eq!(count.conversion, Some(Conversion::Int));
    }

    #[test]
    fn test_qos_out_of_range() {
        let result = resolve("[topics.\"a\"]\nqos = 3\n[topics.\"a\".message]\ntype = \"json\"");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
