// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic name matching.
//!
//! Configured topics may carry MQTT-style wildcards:
//!
//! - `+` matches exactly one level
//! - `#` matches zero or more trailing levels (last segment only)
//!
//! ```text
//! "weather/+/temp" matches "weather/yard/temp", not "weather/a/b/temp"
//! "weather/#"      matches "weather", "weather/yard/temp"
//! ```

/// Check whether `pattern` contains a wildcard.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.split('/').any(|seg| seg == "+" || seg == "#")
}

/// Check whether a concrete `topic` matches `pattern`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern.is_empty() || topic.is_empty() {
        return false;
    }
    if pattern == topic {
        return true;
    }
    if !is_wildcard(pattern) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut pattern_levels = pattern.split('/').peekable();
    while let Some(level) = pattern_levels.next() {
        if level == "#" {
            return pattern_levels.peek().is_none();
        }
        match topic_levels.next() {
            Some(_) if level == "+" => {}
            Some(actual) if actual == level => {}
            _ => return false,
        }
    }
    topic_levels.next().is_none()
}

/// Last level of a topic name.
pub fn topic_tail(topic: &str) -> &str {
    topic.rsplit('/').next().unwrap_or(topic)
}
