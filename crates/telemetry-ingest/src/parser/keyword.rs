// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `key=value,key=value` payloads.

use super::{payload_text, ParseError, Parser};
use crate::config::TopicRule;
use crate::value::Value;

/// Parser for flat keyword lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordParser {
    delimiter: String,
    separator: String,
}

impl KeywordParser {
    /// Create a parser splitting chunks on `delimiter` and keys on `separator`.
    pub fn new(delimiter: &str, separator: &str) -> Self {
        Self {
            delimiter: delimiter.to_string(),
            separator: separator.to_string(),
        }
    }
}

impl Parser for KeywordParser {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn extract(
        &self,
        rule: &TopicRule,
        _topic: &str,
        payload: &[u8],
    ) -> Result<Vec<(String, Value)>, ParseError> {
        let text = payload_text(payload)?;
        let mut pairs = Vec::new();
        for chunk in text.split(self.delimiter.as_str()) {
            if chunk.trim().is_empty() {
                continue;
            }
            match chunk.split_once(self.separator.as_str()) {
                Some((key, value)) => {
                    pairs.push((key.trim().to_string(), Value::Text(value.trim().to_string())))
                }
                None => tracing::error!(
                    "Topic '{}': chunk '{}' has no '{}' separator, skipped",
                    rule.topic_pattern,
                    chunk,
                    self.separator
                ),
            }
        }
        if pairs.is_empty() {
            return Err(ParseError::NoFields);
        }
        Ok(pairs)
    }
}
