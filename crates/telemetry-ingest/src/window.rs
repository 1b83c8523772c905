// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Windowed retrieval.
//!
//! A windowed read drains every queued record up to the effective end of
//! the window and feeds it to an accumulator spanning the effective
//! window. Records the accumulator rejects are logged and skipped.

use crate::accumulator::{Accumulator, TimeSpan};
use crate::config::WindowPolicy;
use crate::queue::{QueueHandle, QueueStore};
use crate::record::CanonicalRecord;
use crate::units::{UnitRegistry, UnitSystem};

/// Effective `(start, end]` bounds of a window over one queue.
///
/// With `ignore_start`/`ignore_end` the bound comes from the oldest or
/// newest queued record; an empty queue falls back to the caller bound.
pub fn effective_span(
    store: &QueueStore,
    handle: QueueHandle,
    policy: &WindowPolicy,
    start: f64,
    end: f64,
) -> TimeSpan {
    let base_start = if policy.ignore_start {
        // The oldest record itself must fall inside the half-open span.
        store
            .peek_oldest(handle)
            .map(next_down)
            .unwrap_or(start)
    } else {
        start
    };
    let base_end = if policy.ignore_end {
        store.peek_newest(handle).unwrap_or(end)
    } else {
        end
    };
    TimeSpan::new(
        base_start - policy.adjust_start.as_secs_f64(),
        base_end + policy.adjust_end.as_secs_f64(),
    )
}

/// Read one merged record from a set of queues.
///
/// `new_accumulator` is called once with the union of the effective
/// spans. Returns an empty record stamped `end` if nothing was accumulated.
pub fn windowed_read<A, F>(
    store: &mut QueueStore,
    queues: &[(QueueHandle, WindowPolicy)],
    start: f64,
    end: f64,
    target: UnitSystem,
    units: &dyn UnitRegistry,
    new_accumulator: F,
) -> CanonicalRecord
where
    A: Accumulator,
    F: FnOnce(TimeSpan) -> A,
{
    let spans: Vec<(QueueHandle, TimeSpan)> = queues
        .iter()
        .map(|(handle, policy)| (*handle, effective_span(store, *handle, policy, start, end)))
        .collect();
    let Some(span) = spans
        .iter()
        .map(|(_, span)| *span)
        .reduce(|a, b| TimeSpan::new(a.start.min(b.start), a.stop.max(b.stop)))
    else {
        return CanonicalRecord::new(end, target);
    };

    let mut accumulator = new_accumulator(span);
    for (handle, queue_span) in &spans {
        for record in store.drain(*handle, queue_span.stop) {
            let record = record.to_unit_system(target, units);
            if let Err(e) = accumulator.add_record(&record) {
                tracing::warn!("Ignoring record outside of window: {}", e);
            }
        }
    }

    if accumulator.is_empty() {
        return CanonicalRecord::new(end, target);
    }
    let mut record = accumulator.get_record();
    if queues.iter().any(|(_, policy)| policy.ignore_end) {
        record.timestamp = end;
    }
    record
}

/// Largest float strictly below `ts`.
fn next_down(ts: f64) -> f64 {
    if ts.is_nan() || ts == f64::NEG_INFINITY {
        return ts;
    }
    if ts == 0.0 {
        return -f64::from_bits(1);
    }
    let bits = ts.to_bits();
    if ts > 0.0 {
        f64::from_bits(bits - 1)
    } else {
        f64::from_bits(bits + 1)
    }
}
