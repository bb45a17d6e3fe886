//! # Outbound side of the transport collaborator.
//!
//! The registry hands every new request to a [`Transport`]; sending is
//! fire-and-forget from the core's point of view. Replies and conclusions come
//! back through [`ConversationRegistry`](crate::ConversationRegistry)'s
//! `deliver` / `mark_succeeded` / `mark_failed`.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::conversation::conversation::{ConversationId, Payload};
use crate::error::TransportError;

/// Request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Id replies must be delivered under.
    pub conversation: ConversationId,
    /// Destination service.
    pub destination: String,
    /// Protocol name.
    pub protocol: String,
    /// Encoded request.
    pub payload: Payload,
}

/// Transport-assigned receipt for a sent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryToken(pub u64);

/// Sends requests on behalf of the registry.
///
/// Implementations must not block: queue the request and return.
pub trait Transport: Send + Sync + 'static {
    /// Accepts `request` for delivery.
    fn send(&self, request: OutboundRequest) -> Result<DeliveryToken, TransportError>;
}

/// In-process transport: pushes requests into an unbounded channel.
///
/// Whoever owns the receiver plays the destination service and answers
/// through the registry.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundRequest>,
    next: AtomicU64,
}

impl ChannelTransport {
    /// Creates the transport and the receiving end of its queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                next: AtomicU64::new(1),
            },
            rx,
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&self, request: OutboundRequest) -> Result<DeliveryToken, TransportError> {
        self.tx
            .send(request)
            .map_err(|_| TransportError::Closed)?;
        Ok(DeliveryToken(self.next.fetch_add(1, Ordering::Relaxed)))
    }
}
