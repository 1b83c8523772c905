// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cumulative-counter delta state.

use std::collections::HashMap;

/// Outcome of feeding one reading to [`CounterState::delta`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    /// No baseline yet; the reading is emitted as-is.
    First(f64),
    /// Increment since the previous reading.
    Increment(f64),
    /// The total went down and the counter wraps; the reading is the increment.
    Wrapped(f64),
    /// The total went down and the counter does not wrap; nothing is emitted.
    Skipped,
}

impl Delta {
    /// Value to emit, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Delta::First(v) | Delta::Increment(v) | Delta::Wrapped(v) => Some(*v),
            Delta::Skipped => None,
        }
    }
}

/// Previous totals, keyed by source field key across all topics.
#[derive(Debug, Clone, Default)]
pub struct CounterState {
    previous: HashMap<String, f64>,
}

impl CounterState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a new total for `key` and compute what to emit.
    ///
    /// The stored total is always updated, including when the reading is
    /// skipped, so later deltas are measured from the latest total.
    pub fn delta(&mut self, key: &str, current: f64, wraps_around: bool) -> Delta {
        let previous = self.previous.insert(key.to_string(), current);
        match previous {
            None => Delta::First(current),
            Some(prev) if current >= prev => Delta::Increment(current - prev),
            Some(prev) if wraps_around => {
                tracing::info!(
                    "Counter '{}' wrapped around ({} -> {}), using {} as increment",
                    key,
                    prev,
                    current,
                    current
                );
                Delta::Wrapped(current)
            }
            Some(prev) => {
                tracing::warn!(
                    "Counter '{}' went backwards ({} -> {}), skipping value",
                    key,
                    prev,
                    current
                );
                Delta::Skipped
            }
        }
    }

    /// Number of tracked counters.
    pub fn len(&self) -> usize {
        self.previous.len()
    }

    /// Check whether no counter is tracked.
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(readings: &[f64], wraps: bool) -> Vec<Option<f64>> {
        let mut state = CounterState::new();
        readings
            .iter()
            .map(|r| state.delta("rain", *r, wraps).value())
            .collect()
    }

    #[test]
    fn test_non_wrapping_decrease_is_skipped() {
        assert_eq!(emitted(&[10.0, 15.0, 12.0], false), vec![Some(10.0), Some(5.0), None]);
    }

    #[test]
    fn test_wraparound_emits_current() {
        assert_eq!(emitted(&[10.0, 15.0, 3.0], true), vec![Some(10.0), Some(5.0), Some(3.0)]);
    }

    #[test]
    fn test_skip_still_updates_baseline() {
        let mut state = CounterState::new();
        state.delta("rain", 15.0, false);
        assert_eq!(state.delta("rain", 12.0, false), Delta::Skipped);
        assert_eq!(state.delta("rain", 14.0, false), Delta::Increment(2.0));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut state = CounterState::new();
        state.delta("rain", 10.0, false);
        assert_eq!(state.delta("lightning", 3.0, false), Delta::First(3.0));
        assert_eq!(state.len(), 2);
        assert!(!state.is_empty());
    }
}
