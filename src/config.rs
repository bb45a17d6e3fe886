//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the scheduler, the
//! conversation registry and the built-in tasks.
//!
//! Config is used in three ways:
//! 1. **Scheduler creation**: `Scheduler::builder(config)`
//! 2. **Registry creation**: `ConversationRegistry::new(transport, counters, &config)`
//! 3. **TaskSpec defaults**: `TaskSpec::with_defaults(task, &config)`
//!
//! ## Sentinel values
//! - `workers = 0` → one worker per available CPU
//! - `defer_budget = 0` → unlimited defers
//! - `conversation_ttl = 0s` → pending conversations never expire

use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Global configuration for the scheduler runtime.
///
/// ## Field semantics
/// - `grace`: Maximum wait for live tasks to be retired on shutdown
/// - `workers`: Size of the dispatch pool (`0` = available parallelism)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `defer_budget`: Default number of defers before a task is errored (`0` = unlimited)
/// - `conversation_ttl`: How long a conversation may stay Pending (`0s` = forever)
/// - `reap_interval`: How often the registry sweeps for expired conversations
/// - `heartbeat_period`: Delay between two heartbeat invocations
/// - `poll_backoff`: Cadence for tasks polling a conversation
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for graceful shutdown.
    pub grace: Duration,

    /// Number of dispatch workers draining the ready queue.
    pub workers: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Default defer budget per task. Used by `TaskSpec::with_defaults()`.
    pub defer_budget: u32,

    /// Lifetime of a Pending conversation before the registry marks it Failed.
    pub conversation_ttl: Duration,

    /// Interval between two registry sweeps.
    pub reap_interval: Duration,

    /// Heartbeat period.
    pub heartbeat_period: Duration,

    /// Backoff used between polls of an unanswered conversation.
    pub poll_backoff: BackoffPolicy,
}

impl Config {
    /// Returns the number of dispatch workers, resolving the `0` sentinel.
    #[inline]
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// Returns the default defer budget as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → errored after more than `n` defers
    #[inline]
    pub fn default_defer_budget(&self) -> Option<u32> {
        if self.defer_budget == 0 {
            None
        } else {
            Some(self.defer_budget)
        }
    }

    /// Returns the conversation lifetime as an `Option`.
    #[inline]
    pub fn conversation_ttl(&self) -> Option<Duration> {
        if self.conversation_ttl == Duration::ZERO {
            None
        } else {
            Some(self.conversation_ttl)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 5s`
    /// - `workers = 0` (available parallelism)
    /// - `bus_capacity = 1024`
    /// - `defer_budget = 0` (unlimited)
    /// - `conversation_ttl = 30s`
    /// - `reap_interval = 1s`
    /// - `heartbeat_period = 1000ms`
    /// - `poll_backoff` = 10ms doubling up to 1s, no jitter
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            workers: 0,
            bus_capacity: 1024,
            defer_budget: 0,
            conversation_ttl: Duration::from_secs(30),
            reap_interval: Duration::from_secs(1),
            heartbeat_period: Duration::from_millis(1000),
            poll_backoff: BackoffPolicy {
                first: Duration::from_millis(10),
                max: Duration::from_secs(1),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
        }
    }
}
