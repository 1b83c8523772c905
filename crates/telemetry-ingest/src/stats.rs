// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-topic ingest statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for one configured topic.
#[derive(Debug)]
pub struct TopicStats {
    /// Configured topic name or pattern.
    pub topic: String,

    /// Messages delivered for this topic.
    pub messages_received: AtomicU64,

    /// Records placed on a queue.
    pub records_queued: AtomicU64,

    /// Messages dropped by filters or for carrying no fields.
    pub messages_dropped: AtomicU64,

    /// Messages rejected as malformed.
    pub parse_errors: AtomicU64,

    /// Queued records evicted to make room.
    pub evictions: AtomicU64,

    /// Creation time.
    pub created: Instant,
}

impl TopicStats {
    /// Create zeroed stats.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            messages_received: AtomicU64::new(0),
            records_queued: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Record a delivered message.
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record queued records and the evictions they caused.
    pub fn record_queued(&self, records: u64, evicted: u64) {
        self.records_queued.fetch_add(records, Ordering::Relaxed);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Record a dropped message.
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a parse error.
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> TopicStatsSnapshot {
        TopicStatsSnapshot {
            topic: self.topic.clone(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            records_queued: self.records_queued.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

/// Snapshot of topic statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStatsSnapshot {
    pub topic: String,
    pub messages_received: u64,
    pub records_queued: u64,
    pub messages_dropped: u64,
    pub parse_errors: u64,
    pub evictions: u64,
    pub uptime_secs: u64,
}

impl TopicStatsSnapshot {
    /// Calculate messages per second.
    pub fn messages_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.messages_received as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}
