// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingest configuration.
//!
//! The configuration file is read once into a generic TOML tree; the
//! resolver then merges its layers into typed [`TopicRule`]s.

pub mod conversion;
mod options;
pub mod resolve;
pub mod rules;

pub use conversion::{Conversion, ConversionRegistry};
pub use resolve::{ResolvedConfig, Resolver, ServiceOptions, COLLECTOR_TOPIC};
pub use rules::{
    ConversionErrorPolicy, FieldDefaults, FieldRule, PayloadGrammar, TopicRule, WindowPolicy,
};

use crate::units::UnitRegistry;
use std::path::Path;
use thiserror::Error;
use toml::Table;

/// Configuration errors. All are fatal to startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("No topics configured")]
    NoTopics,

    #[error("Unknown unit system '{name}' for topic '{topic}'")]
    UnknownUnitSystem { topic: String, name: String },

    #[error("Unknown unit '{unit}' for field '{field}' of topic '{topic}'")]
    UnknownUnit {
        topic: String,
        field: String,
        unit: String,
    },

    #[error("Topic '{0}' has no message type configured")]
    MissingGrammar(String),

    #[error("Topic '{topic}' has unknown message type '{kind}'")]
    UnknownGrammar { topic: String, kind: String },

    #[error("Option '{key}' in [{path}] is deprecated: {hint}")]
    Deprecated {
        key: String,
        path: String,
        hint: &'static str,
    },

    #[error("Unknown conversion '{name}' for field '{field}'")]
    UnknownConversion { field: String, name: String },

    #[error("Invalid value '{value}' for option '{key}'")]
    InvalidValue { key: String, value: String },

    #[error("Time reference topic '{0}' is not a configured topic")]
    UnknownTimeReference(String),

    #[error("Invalid options in [{path}]: {source}")]
    Options {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Raw ingest configuration tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestConfig {
    tree: Table,
}

impl IngestConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let tree: Table = toml::from_str(content)?;
        Ok(Self { tree })
    }

    /// Wrap an already-parsed tree.
    pub fn from_table(tree: Table) -> Self {
        Self { tree }
    }

    /// The raw tree.
    pub fn tree(&self) -> &Table {
        &self.tree
    }

    /// Resolve into typed rules with the given registries.
    pub fn resolve(
        &self,
        units: &dyn UnitRegistry,
        conversions: &ConversionRegistry,
    ) -> Result<ResolvedConfig, ConfigError> {
        Resolver::new(units, conversions).resolve(&self.tree)
    }
}

/// Merge scalar entries of several layers; later layers win.
/// Sub-tables are not carried over.
pub(crate) fn merge_layers(layers: &[&Table]) -> Table {
    let mut merged = Table::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            if !value.is_table() {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use toml::Value as TomlValue;

    fn table(src: &str) -> Table {
        toml::from_str(src).expect("parse")
    }

    #[test]
    fn test_merge_layers_later_wins() {
        let a = table("x = 1\ny = 2\n[sub]\nz = 3");
        let b = table("y = 5");
        let merged = merge_layers(&[&a, &b]);
        assert_eq!(merged.get("x"), Some(&TomlValue::Integer(1)));
        assert_eq!(merged.get("y"), Some(&TomlValue::Integer(5)));
        assert!(merged.get("sub").is_none());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[topics.\"a/b\".message]\ntype = \"json\"").expect("write");
        let config = IngestConfig::from_file(file.path()).expect("load");
        assert!(config.tree().contains_key("topics"));
    }

    #[test]
    fn test_from_toml_str_error() {
        let result = IngestConfig::from_toml_str("[topics");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }
}
