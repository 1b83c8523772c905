// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record timestamps.
//!
//! A payload may carry its own `dateTime`, either as epoch seconds or as
//! text in the topic's `datetime_format` (plus `offset_format` when the
//! text ends with a UTC offset). Text without an offset is taken as UTC.
//! NaN and infinite timestamps are rejected: they never fall inside a window.

use super::ParseError;
use crate::config::TopicRule;
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Timestamp of a record, in epoch seconds.
///
/// Falls back to `arrival` when the topic uses the server clock or the
/// payload has no `dateTime`.
pub fn resolve(rule: &TopicRule, raw: Option<&Value>, arrival: f64) -> Result<f64, ParseError> {
    if rule.use_server_clock {
        return finite(arrival);
    }
    let ts = match raw {
        None | Some(Value::Null) => arrival,
        Some(Value::Int(i)) => *i as f64,
        Some(Value::Float(f)) => *f,
        Some(Value::Text(text)) => parse_text(
            text.trim(),
            rule.timestamp_format.as_deref(),
            rule.timestamp_offset_format.as_deref(),
        )?,
        Some(other) => {
            return Err(ParseError::Malformed(format!(
                "unusable dateTime '{}'",
                other
            )))
        }
    };
    finite(ts)
}

/// Parse a textual timestamp.
pub fn parse_text(
    text: &str,
    format: Option<&str>,
    offset_format: Option<&str>,
) -> Result<f64, ParseError> {
    let malformed = |reason: String| {
        ParseError::Malformed(format!("cannot parse dateTime '{}': {}", text, reason))
    };

    let Some(format) = format else {
        if let Ok(epoch) = text.parse::<f64>() {
            return finite(epoch).map_err(|_| malformed("not a finite number".to_string()));
        }
        return DateTime::parse_from_rfc3339(text)
            .map(|dt| epoch_seconds(&dt))
            .map_err(|e| malformed(e.to_string()));
    };

    match offset_format {
        Some(offset_format) => {
            let full = format!("{}{}", format, offset_format);
            DateTime::parse_from_str(text, &full)
                .map(|dt| epoch_seconds(&dt))
                .map_err(|e| malformed(e.to_string()))
        }
        None => NaiveDateTime::parse_from_str(text, format)
            .map(|naive| epoch_seconds(&Utc.from_utc_datetime(&naive)))
            .map_err(|e| malformed(e.to_string())),
    }
}

fn finite(ts: f64) -> Result<f64, ParseError> {
    if ts.is_finite() {
        Ok(ts)
    } else {
        Err(ParseError::Malformed(format!("dateTime {} is not finite", ts)))
    }
}

fn epoch_seconds<Tz: TimeZone>(dt: &DateTime<Tz>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}
