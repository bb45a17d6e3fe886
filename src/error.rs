//! Error types used by the scheduler, conversations and tasks.
//!
//! This module defines the main error enums:
//!
//! - [`RuntimeError`]: errors raised by the scheduler runtime itself.
//! - [`TaskError`]: errors raised by an entry-point invocation.
//! - [`TransportError`]: synchronous send failures reported by a [`Transport`](crate::Transport).
//! - [`ForwardError`]: an answer could not be handed back to the requester.
//!
//! All types provide `as_label` (stable snake_case, for logs/metrics).
//! [`RuntimeError`] and [`TaskError`] also provide `as_message`.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the scheduler runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some tasks were still live.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of tasks that were not retired in time.
        stuck: Vec<String>,
    },

    /// The scheduler no longer accepts tasks (shutdown in progress or done).
    #[error("scheduler is closed")]
    Closed,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use parley::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Closed => "runtime_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck tasks={stuck:?}")
            }
            RuntimeError::Closed => "scheduler closed".to_string(),
        }
    }
}

/// # Errors produced by an entry-point invocation.
///
/// Every variant is terminal: the scheduler retires the task as Errored.
/// There is no automatic retry; tasks that want one defer instead of failing.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The inbound request could not be turned into an outbound one.
    #[error("malformed request: {reason}")]
    Malformed {
        /// What was wrong with the request.
        reason: String,
    },

    /// The conversation backing this task failed.
    #[error("conversation {conversation} failed: {reason}")]
    Transport {
        /// Conversation id.
        conversation: u64,
        /// Failure details.
        reason: String,
    },

    /// A reply arrived but could not be decoded.
    #[error("undecodable reply: {reason}")]
    Decode {
        /// Decoder message.
        reason: String,
    },

    /// A result named an entry point the task does not have.
    #[error("entry point {index} out of range (task has {available})")]
    InvalidEntry {
        /// Requested index.
        index: usize,
        /// Number of entry points in the task's table.
        available: usize,
    },

    /// The entry point panicked; the panic was contained.
    #[error("entry point panicked: {info}")]
    Panicked {
        /// Panic payload, when it was a string.
        info: String,
    },

    /// The task deferred more times than its budget allows.
    #[error("defer budget exhausted after {defers} defers")]
    DeferBudgetExhausted {
        /// Number of defers performed.
        defers: u32,
    },
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use parley::TaskError;
    ///
    /// let err = TaskError::DeferBudgetExhausted { defers: 3 };
    /// assert_eq!(err.as_label(), "task_defer_budget_exhausted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Malformed { .. } => "task_malformed",
            TaskError::Transport { .. } => "task_transport",
            TaskError::Decode { .. } => "task_decode",
            TaskError::InvalidEntry { .. } => "task_invalid_entry",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::DeferBudgetExhausted { .. } => "task_defer_budget_exhausted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Malformed { reason } => format!("malformed: {reason}"),
            TaskError::Transport {
                conversation,
                reason,
            } => format!("transport: conversation={conversation} {reason}"),
            TaskError::Decode { reason } => format!("decode: {reason}"),
            TaskError::InvalidEntry { index, available } => {
                format!("invalid entry: index={index} available={available}")
            }
            TaskError::Panicked { info } => format!("panicked: {info}"),
            TaskError::DeferBudgetExhausted { defers } => {
                format!("defer budget exhausted: defers={defers}")
            }
        }
    }
}

/// # Synchronous failure to hand a request to the transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has shut down.
    #[error("transport closed")]
    Closed,
    /// The destination is unknown to the transport.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Closed => "transport_closed",
            TransportError::UnknownDestination(_) => "transport_unknown_destination",
        }
    }
}

/// # Failure to forward an answer to the requester. Never fatal to a task.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// The requester's endpoint is gone.
    #[error("requester endpoint gone")]
    EndpointGone,
    /// The forwarding channel refused the answer.
    #[error("forward rejected: {0}")]
    Rejected(String),
}

impl ForwardError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ForwardError::EndpointGone => "forward_endpoint_gone",
            ForwardError::Rejected(_) => "forward_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_labels_are_stable() {
        assert_eq!(
            TaskError::Malformed {
                reason: "x".into()
            }
            .as_label(),
            "task_malformed"
        );
        assert_eq!(
            TaskError::Panicked { info: "boom".into() }.as_label(),
            "task_panicked"
        );
        assert_eq!(
            TaskError::InvalidEntry {
                index: 4,
                available: 2
            }
            .as_message(),
            "invalid entry: index=4 available=2"
        );
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::GraceExceeded {
            grace: Duration::from_secs(1),
            stuck: vec!["search".into()],
        };
        assert!(err.to_string().contains("search"));
        assert_eq!(RuntimeError::Closed.as_label(), "runtime_closed");
    }
}
