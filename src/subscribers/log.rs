//! # LogWriter: renders events through `tracing`
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO parley: submitted task="search" id=4 entry="create_conv"
//! DEBUG parley: deferred task="search" id=4 entry="handle_response" delay_ms=Some(10)
//! INFO parley: completed task="search" id=4 invocations=3
//! WARN parley: errored task="search" id=7 reason="conversation 9 failed: failed"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::TaskSubmitted => {
                info!(target: "parley", task, id = ?e.task_id, entry = ?e.entry, "submitted");
            }
            EventKind::TaskDeferred => {
                debug!(
                    target: "parley",
                    task, id = ?e.task_id, entry = ?e.entry, delay_ms = ?e.delay_ms,
                    "deferred"
                );
            }
            EventKind::TaskCompleted => {
                info!(target: "parley", task, id = ?e.task_id, invocations = ?e.invocation, "completed");
            }
            EventKind::TaskErrored => {
                warn!(target: "parley", task, id = ?e.task_id, reason, "errored");
            }
            EventKind::TaskCancelled => {
                info!(target: "parley", task, id = ?e.task_id, "cancelled");
            }
            EventKind::ConversationLeaked => {
                warn!(
                    target: "parley",
                    task, id = ?e.task_id, conversation = ?e.conversation,
                    "conversation released with unread replies"
                );
            }
            EventKind::ShutdownRequested => info!(target: "parley", "shutdown requested"),
            EventKind::AllStoppedWithin => info!(target: "parley", "all tasks retired within grace"),
            EventKind::GraceExceeded => error!(target: "parley", "grace exceeded"),
            EventKind::SubscriberOverflow => {
                warn!(target: "parley", subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                error!(target: "parley", subscriber = task, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
