// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Last-known values for fields with an expiry.
//!
//! Fields configured with `expires_after` are remembered when observed and
//! can stand in for the same field when a later record lacks it.

use crate::record::CanonicalRecord;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct CachedValue {
    value: Value,
    timestamp: f64,
}

/// Cache of last-known field values.
#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    expiries: BTreeMap<String, Duration>,
    entries: HashMap<String, CachedValue>,
}

impl RecordCache {
    /// Create a cache for the given fields and lifetimes.
    pub fn new(expiries: BTreeMap<String, Duration>) -> Self {
        Self {
            expiries,
            entries: HashMap::new(),
        }
    }

    /// Check whether `field` takes part in the cache.
    pub fn is_cached(&self, field: &str) -> bool {
        self.expiries.contains_key(field)
    }

    /// Remember the cached fields of `record`. Null values are not cached.
    pub fn update(&mut self, record: &CanonicalRecord) {
        for (name, value) in &record.fields {
            if value.is_null() || !self.is_cached(name) {
                continue;
            }
            self.entries.insert(
                name.clone(),
                CachedValue {
                    value: value.clone(),
                    timestamp: record.timestamp,
                },
            );
        }
    }

    /// Cached value of `field`, if it has not expired at `now`.
    pub fn get(&self, field: &str, now: f64) -> Option<&Value> {
        let expiry = self.expiries.get(field)?;
        let entry = self.entries.get(field)?;
        if now - entry.timestamp <= expiry.as_secs_f64() {
            Some(&entry.value)
        } else {
            None
        }
    }

    /// Insert cached values for cached fields absent from `record`.
    /// Returns the names that were filled in.
    pub fn fill_missing(&self, record: &mut CanonicalRecord) -> Vec<String> {
        let mut filled = Vec::new();
        for field in self.expiries.keys() {
            if record.fields.contains_key(field) {
                continue;
            }
            if let Some(value) = self.get(field, record.timestamp) {
                record.fields.insert(field.clone(), value.clone());
                filled.push(field.clone());
            }
        }
        if !filled.is_empty() {
            tracing::debug!("Filled {:?} from cache at {}", filled, record.timestamp);
        }
        filled
    }

    /// Drop expired entries.
    pub fn purge(&mut self, now: f64) {
        let expiries = &self.expiries;
        self.entries.retain(|name, entry| {
            expiries
                .get(name)
                .map(|expiry| now - entry.timestamp <= expiry.as_secs_f64())
                .unwrap_or(false)
        });
    }

    /// Number of remembered values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
