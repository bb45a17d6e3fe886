//! # Runtime events emitted by the scheduler.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Task events**: submission, defer, terminal outcome
//! - **Resource events**: conversations released undrained
//! - **Runtime events**: shutdown, subscriber health
//!
//! The [`Event`] struct carries metadata such as timestamps, task name/id,
//! entry-point name, reasons and defer delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use parley::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskDeferred)
//!     .with_task("search")
//!     .with_entry("handle_response")
//!     .with_delay(Duration::from_millis(20));
//!
//! assert_eq!(ev.kind, EventKind::TaskDeferred);
//! assert_eq!(ev.entry, Some("handle_response"));
//! assert_eq!(ev.delay_ms, Some(20));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `task` (subscriber name) and `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `task` (subscriber name) and `reason`.
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// Every live task was retired within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some tasks were still live.
    GraceExceeded,

    // === Task events ===
    /// Task accepted by the scheduler.
    ///
    /// Sets `task`, `task_id`, `entry` (first entry point).
    TaskSubmitted,

    /// Task returned Defer.
    ///
    /// Sets `task`, `task_id`, `entry` (next entry point), `invocation`,
    /// `delay_ms` (absent for an immediate yield).
    TaskDeferred,

    /// Task returned Complete and was destroyed.
    ///
    /// Sets `task`, `task_id`, `invocation`.
    TaskCompleted,

    /// Task returned Errored (or failed locally) and was destroyed.
    ///
    /// Sets `task`, `task_id`, `invocation`, `reason`.
    TaskErrored,

    /// Task was cancelled before reaching a terminal outcome.
    ///
    /// Sets `task`, `task_id`.
    TaskCancelled,

    // === Resource events ===
    /// A retired task still held a conversation with unread replies.
    ///
    /// Sets `task`, `task_id`, `conversation`.
    ConversationLeaked,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the task (or subscriber), if applicable.
    pub task: Option<Arc<str>>,
    /// Scheduler-assigned task id.
    pub task_id: Option<u64>,
    /// Entry point involved.
    pub entry: Option<&'static str>,
    /// Number of invocations performed so far (1-based).
    pub invocation: Option<u32>,
    /// Defer delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Conversation id, if applicable.
    pub conversation: Option<u64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            task_id: None,
            entry: None,
            invocation: None,
            delay_ms: None,
            conversation: None,
            reason: None,
        }
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task_id(mut self, id: u64) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches an entry-point name.
    #[inline]
    pub fn with_entry(mut self, entry: &'static str) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Attaches an invocation count.
    #[inline]
    pub fn with_invocation(mut self, n: u32) -> Self {
        self.invocation = Some(n);
        self
    }

    /// Attaches a defer delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a conversation id.
    #[inline]
    pub fn with_conversation(mut self, id: u64) -> Self {
        self.conversation = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// True for the terminal task events.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskCompleted | EventKind::TaskErrored | EventKind::TaskCancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::TaskSubmitted);
        let b = Event::new(EventKind::TaskSubmitted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_saturates() {
        let ev = Event::new(EventKind::TaskDeferred).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(Event::new(EventKind::TaskErrored).is_terminal());
        assert!(!Event::new(EventKind::TaskDeferred).is_terminal());
    }
}
