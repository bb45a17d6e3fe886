//! # Forwarding channel back to the requester.
//!
//! Best-effort: a failed forward is reported to the caller, who logs and counts
//! it; it never fails the task.

use tokio::sync::mpsc;

use crate::conversation::Payload;
use crate::error::ForwardError;

/// Hands an encoded answer to the requester's endpoint.
pub trait Forward: Send + Sync + 'static {
    /// Forwards `answer` to `endpoint`. Must not block.
    fn forward(&self, answer: Payload, endpoint: &str) -> Result<(), ForwardError>;
}

/// Answer captured by a [`ChannelForwarder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedAnswer {
    pub endpoint: String,
    pub payload: Payload,
}

/// In-process forwarder pushing answers into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelForwarder {
    tx: mpsc::UnboundedSender<ForwardedAnswer>,
}

impl ChannelForwarder {
    /// Creates the forwarder and the receiving end of its queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ForwardedAnswer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Forward for ChannelForwarder {
    fn forward(&self, answer: Payload, endpoint: &str) -> Result<(), ForwardError> {
        self.tx
            .send(ForwardedAnswer {
                endpoint: endpoint.to_string(),
                payload: answer,
            })
            .map_err(|_| ForwardError::EndpointGone)
    }
}
