// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport-facing ingest service.
//!
//! The [`Ingestor`] owns the resolved rules, one parser per topic, the
//! queue store and the counter state. It is `Sync`: the transport calls
//! [`Ingestor::on_message`] from its own context while periodic consumers
//! call [`Ingestor::windowed_read`] or [`Ingestor::drain_all`].

use crate::accumulator::{Accumulator, TimeSpan};
use crate::cache::RecordCache;
use crate::config::{
    ConfigError, ConversionRegistry, IngestConfig, ResolvedConfig, TopicRule, WindowPolicy,
    COLLECTOR_TOPIC,
};
use crate::counter::CounterState;
use crate::parser::{parser_for, ParseContext, ParseError, Parser};
use crate::queue::{QueueHandle, QueueStore};
use crate::record::CanonicalRecord;
use crate::stats::{TopicStats, TopicStatsSnapshot};
use crate::topic::topic_matches;
use crate::units::{UnitRegistry, UnitSystem};
use crate::window;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Ingest errors.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No topic configured for '{0}'")]
    UnknownTopic(String),

    #[error("Topic '{topic}': {source}")]
    Parse {
        topic: String,
        #[source]
        source: ParseError,
    },
}

/// A subscription the transport should make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: u8,
}

/// Ingest service.
pub struct Ingestor {
    config: ResolvedConfig,
    units: Arc<dyn UnitRegistry>,
    parsers: BTreeMap<String, Box<dyn Parser>>,
    stats: BTreeMap<String, Arc<TopicStats>>,
    queues: Mutex<QueueStore>,
    counters: Mutex<CounterState>,
    cache: Mutex<RecordCache>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(e) => {
            tracing::debug!("[Ingestor] {} lock poisoned, recovering", what);
            e.into_inner()
        }
    }
}

/// Current time in epoch seconds.
pub fn now_epoch() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

impl Ingestor {
    /// Build from resolved rules. Parsers are selected here, once per topic.
    pub fn new(config: ResolvedConfig, units: Arc<dyn UnitRegistry>) -> Self {
        let parsers = config
            .topics
            .iter()
            .map(|(name, rule)| (name.clone(), parser_for(&rule.grammar)))
            .collect();
        let stats = config
            .topics
            .keys()
            .map(|name| (name.clone(), Arc::new(TopicStats::new(name.clone()))))
            .collect();
        let queues = QueueStore::new(&config);
        let cache = RecordCache::new(config.cached_fields.clone());

        for (name, rule) in &config.topics {
            tracing::info!(
                "Topic '{}': {} payloads, {} units, queue '{}'",
                name,
                rule.grammar.kind_name(),
                rule.unit_system,
                queues
                    .queue(rule.queue)
                    .map(|q| q.spec().name.as_str())
                    .unwrap_or("?")
            );
        }

        Self {
            config,
            units,
            parsers,
            stats,
            queues: Mutex::new(queues),
            counters: Mutex::new(CounterState::new()),
            cache: Mutex::new(cache),
        }
    }

    /// Resolve a raw configuration and build the service.
    pub fn from_config(
        raw: &IngestConfig,
        units: Arc<dyn UnitRegistry>,
        conversions: &ConversionRegistry,
    ) -> Result<Self, IngestError> {
        let resolved = raw.resolve(units.as_ref(), conversions)?;
        Ok(Self::new(resolved, units))
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Configured topic for a concrete topic name: exact match first,
    /// then the first matching wildcard pattern.
    pub fn lookup(&self, topic: &str) -> Option<(&str, &TopicRule)> {
        if let Some((name, rule)) = self.config.topics.get_key_value(topic) {
            return Some((name.as_str(), rule));
        }
        self.config
            .topics
            .iter()
            .find(|(pattern, _)| topic_matches(pattern, topic))
            .map(|(name, rule)| (name.as_str(), rule))
    }

    /// Topics the transport should subscribe to. Never includes the collector.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.config
            .topics
            .values()
            .filter(|rule| rule.subscribe)
            .map(|rule| Subscription {
                topic: rule.topic_pattern.clone(),
                qos: rule.qos,
            })
            .collect()
    }

    /// Transport callback. Returns the number of records queued.
    pub fn on_message(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<usize, IngestError> {
        tracing::trace!(
            "Message on '{}' (qos {}, retain {}): {} bytes",
            topic,
            qos,
            retain,
            payload.len()
        );
        self.on_message_at(topic, payload, now_epoch())
    }

    /// Handle a message that arrived at `arrival` (epoch seconds).
    pub fn on_message_at(
        &self,
        topic: &str,
        payload: &[u8],
        arrival: f64,
    ) -> Result<usize, IngestError> {
        let Some((name, rule)) = self.lookup(topic) else {
            tracing::warn!("Message on unconfigured topic '{}' ignored", topic);
            return Err(IngestError::UnknownTopic(topic.to_string()));
        };
        let (Some(parser), Some(stats)) = (self.parsers.get(name), self.stats.get(name)) else {
            return Err(IngestError::UnknownTopic(topic.to_string()));
        };
        stats.record_received();

        let parsed = {
            let mut counters = lock(&self.counters, "counter");
            let mut ctx = ParseContext {
                counters: &mut counters,
                units: self.units.as_ref(),
                arrival,
            };
            parser.parse(rule, topic, payload, &mut ctx)
        };

        let record = match parsed {
            Ok(record) => record,
            Err(e) if e.is_filtered() => {
                tracing::debug!("Topic '{}': {}", topic, e);
                stats.record_dropped();
                return Err(IngestError::Parse {
                    topic: topic.to_string(),
                    source: e,
                });
            }
            Err(e) => {
                tracing::error!(
                    "Topic '{}': {} (payload {:?})",
                    topic,
                    e,
                    String::from_utf8_lossy(payload)
                );
                stats.record_parse_error();
                return Err(IngestError::Parse {
                    topic: topic.to_string(),
                    source: e,
                });
            }
        };

        if record.is_empty() {
            tracing::debug!("Topic '{}': no fields left after ignore rules", topic);
            stats.record_dropped();
            return Ok(0);
        }

        lock(&self.cache, "cache").update(&record);

        let mut store = lock(&self.queues, "queue");
        let (queued, evicted) = self.enqueue(&mut store, rule.queue, record);
        stats.record_queued(queued as u64, evicted as u64);
        Ok(queued)
    }

    /// Queue a parsed record, splitting collector fields out of it.
    fn enqueue(
        &self,
        store: &mut QueueStore,
        handle: QueueHandle,
        mut record: CanonicalRecord,
    ) -> (usize, usize) {
        let collected: Vec<String> = record
            .fields
            .keys()
            .filter(|name| store.is_collected(name))
            .cloned()
            .collect();

        let mut queued = 0;
        let mut evicted = 0;
        for name in collected {
            if let Some(value) = record.fields.remove(&name) {
                let single = CanonicalRecord::new(record.timestamp, record.unit_system)
                    .with_field(name.clone(), value);
                evicted += store.append(handle, single, Some(name)).evicted;
                queued += 1;
            }
        }
        if !record.is_empty() {
            evicted += store.append(handle, record, None).evicted;
            queued += 1;
        }
        (queued, evicted)
    }

    fn queue_for(&self, topic: &str) -> Result<(QueueHandle, WindowPolicy), IngestError> {
        if topic == COLLECTOR_TOPIC {
            return Ok((self.config.collector.queue, self.config.collector.window));
        }
        self.config
            .topics
            .get(topic)
            .or_else(|| self.lookup(topic).map(|(_, rule)| rule))
            .map(|rule| (rule.queue, rule.window))
            .ok_or_else(|| IngestError::UnknownTopic(topic.to_string()))
    }

    /// Merge the queued records of one topic in `(start, end]` into one record.
    pub fn windowed_read<A, F>(
        &self,
        topic: &str,
        start: f64,
        end: f64,
        unit_system: UnitSystem,
        new_accumulator: F,
    ) -> Result<CanonicalRecord, IngestError>
    where
        A: Accumulator,
        F: FnOnce(TimeSpan) -> A,
    {
        let queue = self.queue_for(topic)?;
        let mut store = lock(&self.queues, "queue");
        Ok(window::windowed_read(
            &mut store,
            &[queue],
            start,
            end,
            unit_system,
            self.units.as_ref(),
            new_accumulator,
        ))
    }

    /// Merge the queued records of every queue, collector included.
    pub fn windowed_read_all<A, F>(
        &self,
        start: f64,
        end: f64,
        unit_system: UnitSystem,
        new_accumulator: F,
    ) -> CanonicalRecord
    where
        A: Accumulator,
        F: FnOnce(TimeSpan) -> A,
    {
        let mut queues: Vec<(QueueHandle, WindowPolicy)> = Vec::new();
        for rule in self.config.topics.values().chain([&self.config.collector]) {
            if !queues.iter().any(|(handle, _)| *handle == rule.queue) {
                queues.push((rule.queue, rule.window));
            }
        }
        let mut store = lock(&self.queues, "queue");
        window::windowed_read(
            &mut store,
            &queues,
            start,
            end,
            unit_system,
            self.units.as_ref(),
            new_accumulator,
        )
    }

    /// Drain every record of a topic's queue with timestamp `<= bound`.
    pub fn drain_all(&self, topic: &str, bound: f64) -> Result<Vec<CanonicalRecord>, IngestError> {
        let (handle, _) = self.queue_for(topic)?;
        let mut store = lock(&self.queues, "queue");
        Ok(store.drain(handle, bound).collect())
    }

    /// Number of entries queued for a topic.
    pub fn queue_depth(&self, topic: &str) -> Result<usize, IngestError> {
        let (handle, _) = self.queue_for(topic)?;
        Ok(lock(&self.queues, "queue").depth(handle))
    }

    /// Fill cached fields missing from `record`. Returns the filled names.
    ///
    /// Values expired at the record's timestamp are dropped first.
    pub fn fill_from_cache(&self, record: &mut CanonicalRecord) -> Vec<String> {
        let mut cache = lock(&self.cache, "cache");
        cache.purge(record.timestamp);
        cache.fill_missing(record)
    }

    /// Statistics of every topic.
    pub fn stats(&self) -> Vec<TopicStatsSnapshot> {
        self.stats.values().map(|s| s.snapshot()).collect()
    }
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("topics", &self.config.topics.keys().collect::<Vec<_>>())
            .finish()
    }
}
