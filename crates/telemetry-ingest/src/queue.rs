// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded record queues.
//!
//! One FIFO per topic (or one shared FIFO in single-queue mode) plus the
//! collector queue. Appending to a full queue evicts the oldest entry.
//! Draining is destructive, oldest-first and bounded by a timestamp.

use crate::collector::{new_collector, Collector};
use crate::config::ResolvedConfig;
use crate::record::CanonicalRecord;
use std::collections::{BTreeSet, VecDeque};

/// Index of a queue inside a [`QueueStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueHandle(usize);

impl QueueHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the queue in the store.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Queue flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Records are yielded as queued.
    Normal,
    /// Records pass through the collector before being yielded.
    Collector,
}

/// Queue description produced by configuration resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Topic or synthetic queue name.
    pub name: String,
    /// Maximum number of queued entries.
    pub max_depth: usize,
    /// Queue flavor.
    pub kind: QueueKind,
}

/// One queued record.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub record: CanonicalRecord,
    /// Field this record carries for the collector.
    pub field: Option<String>,
}

/// A bounded FIFO.
#[derive(Debug)]
pub struct Queue {
    spec: QueueSpec,
    entries: VecDeque<QueueEntry>,
}

impl Queue {
    fn new(spec: QueueSpec) -> Self {
        Self {
            entries: VecDeque::new(),
            spec,
        }
    }

    /// Queue description.
    pub fn spec(&self) -> &QueueSpec {
        &self.spec
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append, evicting oldest entries first. Returns the number evicted.
    fn push(&mut self, entry: QueueEntry) -> usize {
        let mut evicted = 0;
        while self.entries.len() >= self.spec.max_depth {
            match self.entries.pop_front() {
                Some(dropped) => {
                    evicted += 1;
                    tracing::error!(
                        "Queue '{}' full ({}), dropped record at {}: {:?}",
                        self.spec.name,
                        self.spec.max_depth,
                        dropped.record.timestamp,
                        dropped.record.fields
                    );
                }
                None => break,
            }
        }
        self.entries.push_back(entry);
        evicted
    }

    fn pop_until(&mut self, bound: f64) -> Option<QueueEntry> {
        match self.entries.front() {
            Some(front) if front.record.timestamp <= bound => self.entries.pop_front(),
            _ => None,
        }
    }
}

/// Where an append landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Queue that received the record.
    pub queue: QueueHandle,
    /// Entries evicted to make room.
    pub evicted: usize,
}

/// All queues of an ingest service, plus the collector.
#[derive(Debug)]
pub struct QueueStore {
    queues: Vec<Queue>,
    collector_queue: QueueHandle,
    collector_fields: BTreeSet<String>,
    collector: Box<dyn Collector>,
    across_windows: bool,
    collect_observations: bool,
}

impl QueueStore {
    /// Create the queues described by a resolved configuration.
    pub fn new(config: &ResolvedConfig) -> Self {
        let collector_fields = config.collector_fields();
        let across_windows = config.options.collect_wind_across_loops;
        Self {
            queues: config.queues.iter().cloned().map(Queue::new).collect(),
            collector_queue: config.collector.queue,
            collector: new_collector(across_windows, collector_fields.clone()),
            collector_fields,
            across_windows,
            collect_observations: config.options.collect_observations,
        }
    }

    /// Handle of the collector queue.
    pub fn collector_queue(&self) -> QueueHandle {
        self.collector_queue
    }

    /// Check whether `field` is correlated by the collector.
    pub fn is_collected(&self, field: &str) -> bool {
        self.collector_fields.contains(field)
    }

    /// Queue by handle.
    pub fn queue(&self, handle: QueueHandle) -> Option<&Queue> {
        self.queues.get(handle.index())
    }

    /// Append a record.
    ///
    /// A record carrying a collector-tracked `field` goes to the collector
    /// queue instead of `handle`.
    pub fn append(
        &mut self,
        handle: QueueHandle,
        record: CanonicalRecord,
        field: Option<String>,
    ) -> Appended {
        let target = match &field {
            Some(name) if self.collector_fields.contains(name) => self.collector_queue,
            _ => handle,
        };
        let Some(queue) = self.queues.get_mut(target.index()) else {
            tracing::error!("No queue with index {}, record dropped", target.index());
            return Appended {
                queue: target,
                evicted: 0,
            };
        };
        let evicted = queue.push(QueueEntry { record, field });
        Appended {
            queue: target,
            evicted,
        }
    }

    /// Number of entries in a queue.
    pub fn depth(&self, handle: QueueHandle) -> usize {
        self.queue(handle).map(Queue::len).unwrap_or(0)
    }

    /// Timestamp of the oldest entry.
    pub fn peek_oldest(&self, handle: QueueHandle) -> Option<f64> {
        self.queue(handle)
            .and_then(|q| q.entries.front())
            .map(|e| e.record.timestamp)
    }

    /// Timestamp of the newest entry.
    pub fn peek_newest(&self, handle: QueueHandle) -> Option<f64> {
        self.queue(handle)
            .and_then(|q| q.entries.back())
            .map(|e| e.record.timestamp)
    }

    /// Drain entries with timestamp `<= bound`, oldest first.
    ///
    /// Entries are removed as they are yielded; an abandoned drain leaves
    /// the rest queued. Collector queues yield only collector flushes.
    pub fn drain(&mut self, handle: QueueHandle, bound: f64) -> Drain<'_> {
        let is_collector = self
            .queue(handle)
            .is_some_and(|q| q.spec.kind == QueueKind::Collector);
        if is_collector && !self.across_windows {
            self.collector = new_collector(false, self.collector_fields.clone());
        }
        let mode = if is_collector {
            DrainMode::Collect
        } else if self.collect_observations {
            DrainMode::Merge
        } else {
            DrainMode::Plain
        };
        Drain {
            queue: self.queues.get_mut(handle.index()),
            collector: self.collector.as_mut(),
            bound,
            mode,
            done: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainMode {
    Plain,
    Merge,
    Collect,
}

/// Lazy, single-pass drain of one queue. See [`QueueStore::drain`].
pub struct Drain<'a> {
    queue: Option<&'a mut Queue>,
    collector: &'a mut dyn Collector,
    bound: f64,
    mode: DrainMode,
    done: bool,
}

impl Drain<'_> {
    fn next_entry(&mut self) -> Option<QueueEntry> {
        self.queue.as_mut()?.pop_until(self.bound)
    }
}

impl Iterator for Drain<'_> {
    type Item = CanonicalRecord;

    fn next(&mut self) -> Option<CanonicalRecord> {
        if self.done {
            return None;
        }
        match self.mode {
            DrainMode::Plain => {
                let entry = self.next_entry();
                if entry.is_none() {
                    self.done = true;
                }
                entry.map(|e| e.record)
            }
            DrainMode::Merge => {
                self.done = true;
                let mut merged: Option<CanonicalRecord> = None;
                while let Some(entry) = self.next_entry() {
                    match merged.as_mut() {
                        Some(m) => m.merge_from(&entry.record),
                        None => merged = Some(entry.record),
                    }
                }
                merged
            }
            DrainMode::Collect => {
                while let Some(entry) = self.next_entry() {
                    if let Some(flushed) = self.collector.add(&entry.record, entry.field.as_deref()) {
                        return Some(flushed);
                    }
                }
                self.done = true;
                if self.collector.flushes_at_window_end() {
                    self.collector.flush()
                } else {
                    None
                }
            }
        }
    }
}
