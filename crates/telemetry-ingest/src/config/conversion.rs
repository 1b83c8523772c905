// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value conversions applied to raw field values.
//!
//! The closed set of built-in conversions covers what configuration can
//! name with `conversion_type`. Anything else must be a function
//! registered by trusted code in a [`ConversionRegistry`] and referenced
//! with `conversion_func`; configuration text is never evaluated.

use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a registered conversion function.
pub type ConversionFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// A named, registered conversion function.
#[derive(Clone)]
pub struct CustomConversion {
    name: String,
    func: ConversionFn,
}

impl CustomConversion {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomConversion")
            .field("name", &self.name)
            .finish()
    }
}

// Registered functions are identified by name.
impl PartialEq for CustomConversion {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Value coercion applied to a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Coerce to boolean.
    Bool,
    /// Coerce to float.
    Float,
    /// Coerce to integer.
    Int,
    /// Keep the raw value.
    Raw,
    /// Registered function.
    Custom(CustomConversion),
}

impl Conversion {
    /// Parse a `conversion_type` name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bool" => Some(Self::Bool),
            "float" => Some(Self::Float),
            "int" => Some(Self::Int),
            "string" | "raw" => Some(Self::Raw),
            _ => None,
        }
    }

    /// Apply this conversion. `Null` always converts to `Null`.
    pub fn apply(&self, raw: &Value) -> Result<Value, String> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Raw => Ok(raw.clone()),
            Self::Custom(custom) => (custom.func)(raw),
            Self::Float => match raw {
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| format!("cannot convert '{}' to float: {}", s, e)),
                other => other
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("cannot convert '{}' to float", other)),
            },
            Self::Int => match raw {
                Value::Int(v) => Ok(Value::Int(*v)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(v) if v.is_finite() => Ok(Value::Int(v.trunc() as i64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|e| format!("cannot convert '{}' to int: {}", s, e)),
                other => Err(format!("cannot convert '{}' to int", other)),
            },
            Self::Bool => match raw {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(v) => Ok(Value::Bool(*v != 0)),
                Value::Float(v) => Ok(Value::Bool(*v != 0.0)),
                Value::Text(s) => parse_bool(s)
                    .map(Value::Bool)
                    .ok_or_else(|| format!("cannot convert '{}' to bool", s)),
                Value::Null => Ok(Value::Null),
            },
        }
    }
}

/// Parse the usual textual spellings of a boolean.
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Conversion functions supplied by trusted code at load time.
#[derive(Clone, Default)]
pub struct ConversionRegistry {
    funcs: HashMap<String, ConversionFn>,
}

impl ConversionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.funcs.insert(name.into(), Arc::new(func));
    }

    /// Register a function, builder style.
    pub fn with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, func);
        self
    }

    /// Look up a registered function as a conversion.
    pub fn get(&self, name: &str) -> Option<Conversion> {
        self.funcs.get(name).map(|func| {
            Conversion::Custom(CustomConversion {
                name: name.to_string(),
                func: Arc::clone(func),
            })
        })
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.funcs.keys().collect();
        names.sort();
        f.debug_struct("ConversionRegistry")
            .field("funcs", &names)
            .finish()
    }
}
