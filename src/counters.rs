//! # Named monotonic counters.
//!
//! [`CounterSet`] maps a counter name to a monotonically increasing integer.
//! It is created by the embedder and shared (`Arc`) with the scheduler, the
//! conversation registry and the tasks, so tests can use an isolated instance.
//!
//! ## Rules
//! - Counters are created lazily on first increment and never removed.
//! - Reads are eventually consistent under concurrent increments.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Well-known counter names.
pub mod names {
    pub const TASKS_SUBMITTED: &str = "scheduler.tasks.submitted";
    pub const TASKS_COMPLETED: &str = "scheduler.tasks.completed";
    pub const TASKS_ERRORED: &str = "scheduler.tasks.errored";
    pub const TASKS_CANCELLED: &str = "scheduler.tasks.cancelled";
    pub const CONVERSATIONS_LEAKED: &str = "scheduler.conversations.leaked";

    pub const CONV_CREATED: &str = "conversations.created";
    pub const CONV_DELIVERED: &str = "conversations.delivered";
    pub const CONV_DROPPED_LATE: &str = "conversations.dropped_late";
    pub const CONV_SUCCEEDED: &str = "conversations.succeeded";
    pub const CONV_FAILED: &str = "conversations.failed";
    pub const CONV_EXPIRED: &str = "conversations.expired";
    pub const CONV_SEND_FAILED: &str = "conversations.send_failed";

    pub const SEARCH_CREATED: &str = "search.query.tasks_created";
    pub const SEARCH_RESOLVED: &str = "search.query.tasks_resolved";
    pub const SEARCH_REPLIED: &str = "search.query.tasks_replied";
    pub const SEARCH_UNREPLIED: &str = "search.query.tasks_unreplied";
    pub const SEARCH_SUCCEEDED: &str = "search.query.tasks_succeeded";
}

/// Process-wide (or per-test) set of named counters.
#[derive(Debug, Default)]
pub struct CounterSet {
    counters: DashMap<String, AtomicU64>,
}

impl CounterSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments `name` by one.
    pub fn inc(&self, name: &str) {
        self.add(name, 1);
    }

    /// Increments `name` by `n`.
    pub fn add(&self, name: &str, n: u64) {
        if let Some(c) = self.counters.get(name) {
            c.fetch_add(n, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_default()
            .fetch_add(n, Ordering::Relaxed);
    }

    /// Current value of `name` (`0` if never incremented).
    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sorted copy of every counter, for exporters.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unknown_counter_reads_zero() {
        let c = CounterSet::new();
        assert_eq!(c.get("nope"), 0);
        assert!(c.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_increments() {
        let c = Arc::new(CounterSet::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.inc(names::TASKS_SUBMITTED);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        c.add(names::TASKS_COMPLETED, 5);

        assert_eq!(c.get(names::TASKS_SUBMITTED), 4000);
        let snap = c.snapshot();
        assert_eq!(snap.get(names::TASKS_COMPLETED), Some(&5));
        assert_eq!(snap.len(), 2);
    }
}
