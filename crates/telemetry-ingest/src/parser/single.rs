// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payloads holding one bare value.

use super::{payload_text, ParseError, Parser};
use crate::config::TopicRule;
use crate::topic::topic_tail;
use crate::value::Value;

/// Parser for single-value payloads; the field key comes from the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleValueParser {
    use_topic_tail: bool,
}

impl SingleValueParser {
    /// Create a parser keyed by the full topic, or its last level.
    pub fn new(use_topic_tail: bool) -> Self {
        Self { use_topic_tail }
    }

    /// Field key for a message on `topic`.
    pub fn field_key<'t>(&self, topic: &'t str) -> &'t str {
        if self.use_topic_tail {
            topic_tail(topic)
        } else {
            topic
        }
    }
}

impl Parser for SingleValueParser {
    fn name(&self) -> &'static str {
        "individual"
    }

    fn extract(
        &self,
        _rule: &TopicRule,
        topic: &str,
        payload: &[u8],
    ) -> Result<Vec<(String, Value)>, ParseError> {
        let text = payload_text(payload)?.trim();
        if text.is_empty() {
            return Err(ParseError::EmptyPayload);
        }
        Ok(vec![(
            self.field_key(topic).to_string(),
            Value::Text(text.to_string()),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionRegistry, Resolver};
    use crate::counter::CounterState;
    use crate::parser::ParseContext;
    use crate::units::StandardUnits;

    fn rule(src: &str, topic: &str) -> TopicRule {
        let raw: toml::Table = toml::from_str(src).expect("parse");
        let resolved = Resolver::new(&StandardUnits::new(), &ConversionRegistry::new())
            .resolve(&raw)
            .expect("resolve");
        resolved.topics[topic].clone()
    }

    #[test]
    fn test_full_topic_key_with_shorthand() {
        let rule = rule(
            r#"
[topics."weather/outTemp"]
name = "outTemp"
[topics."weather/outTemp".message]
type = "individual"
"#,
            "weather/outTemp",
        );
        let units = StandardUnits::new();
        let mut counters = CounterState::new();
        let mut ctx = ParseContext {
            counters: &mut counters,
            units: &units,
            arrival: 5.0,
        };
        let record = SingleValueParser::new(false)
            .parse(&rule, "weather/outTemp", b" 72.5\n", &mut ctx)
            .expect("parse");
        assert_eq!(record.get("outTemp"), Some(&Value::Float(72.5)));
        assert_eq!(record.timestamp, 5.0);
    }

    #[test]
    fn test_topic_tail_key() {
        let rule = rule(
            "[topics.\"weather/+\"]\nuse_topic_as_fieldname = true\n[topics.\"weather/+\".message]\ntype = \"individual\"\n",
            "weather/+",
        );
        let pairs = SingleValueParser::new(true)
            .extract(&rule, "weather/inHumidity", b"40")
            .expect("extract");
        assert_eq!(pairs, vec![("inHumidity".to_string(), Value::Text("40".into()))]);
    }

    #[test]
    fn test_empty_payload() {
        let rule = rule(
            "[topics.\"a\".message]\ntype = \"individual\"\n",
            "a",
        );
        assert_eq!(
            SingleValueParser::new(false).extract(&rule, "a", b"  "),
            Err(ParseError::EmptyPayload)
        );
    }
}
