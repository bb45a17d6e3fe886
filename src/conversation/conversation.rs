//! # One outstanding request/reply exchange.
//!
//! A [`Conversation`] is the owning handle a task holds; the registry keeps only
//! a weak routing entry. Transport callbacks and the owning task touch the same
//! [`Exchange`] concurrently, so its mutable state sits behind one lock:
//!
//! ```text
//! transport ── deliver / mark_* ──► Exchange { replies, status } ◄── poll / drain ── task
//! ```
//!
//! ## Rules
//! - Replies are observed in arrival order
//! - `status` leaves `Pending` at most once
//! - Dropping the handle discards the exchange and unregisters it, so late
//!   deliveries are dropped instead of buffered
//! - A Pending exchange past its deadline reads as `Failed("expired")`, whether
//!   or not a reaper has swept it yet

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::conversation::registry::RegistryInner;

pub(crate) const EXPIRED_REASON: &str = "expired";

/// Opaque reply or request payload. The core never interprets its encoding.
pub type Payload = Bytes;

/// Correlates an outbound request with its inbound replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub(crate) u64);

impl ConversationId {
    /// Builds an id from its raw value (as carried by a transport).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conv#{}", self.0)
    }
}

/// Where the exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    /// Waiting for replies or a conclusion.
    Pending,
    /// The destination concluded the exchange.
    Succeeded,
    /// Delivery failed, the destination reported an error, or the exchange expired.
    Failed,
}

impl ConversationStatus {
    /// Stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConversationStatus::Pending => "pending",
            ConversationStatus::Succeeded => "succeeded",
            ConversationStatus::Failed => "failed",
        }
    }
}

pub(crate) struct ExchangeState {
    pub(crate) replies: VecDeque<Payload>,
    pub(crate) status: ConversationStatus,
    pub(crate) failure: Option<String>,
    pub(crate) discarded: bool,
}

/// Shared part of a conversation.
pub(crate) struct Exchange {
    pub(crate) id: ConversationId,
    pub(crate) destination: String,
    pub(crate) protocol: String,
    pub(crate) deadline: Option<Instant>,
    pub(crate) state: Mutex<ExchangeState>,
}

impl Exchange {
    pub(crate) fn new(
        id: ConversationId,
        destination: String,
        protocol: String,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            id,
            destination,
            protocol,
            deadline: ttl.map(|ttl| Instant::now() + ttl),
            state: Mutex::new(ExchangeState {
                replies: VecDeque::new(),
                status: ConversationStatus::Pending,
                failure: None,
                discarded: false,
            }),
        }
    }

    /// Appends a reply. Returns `false` if the exchange no longer accepts any.
    pub(crate) fn push_reply(&self, payload: Payload) -> bool {
        let mut st = self.state.lock();
        if st.discarded || st.status != ConversationStatus::Pending {
            return false;
        }
        st.replies.push_back(payload);
        true
    }

    /// Moves a Pending exchange to `status`. Returns `false` if already concluded.
    pub(crate) fn conclude(&self, status: ConversationStatus, failure: Option<String>) -> bool {
        let mut st = self.state.lock();
        if st.discarded || st.status != ConversationStatus::Pending {
            return false;
        }
        st.status = status;
        st.failure = failure;
        true
    }

    /// Fails a Pending exchange whose deadline is at or before `now`.
    /// Returns `true` only for the call that expired it.
    pub(crate) fn expire_if_due(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => self.conclude(
                ConversationStatus::Failed,
                Some(EXPIRED_REASON.to_string()),
            ),
            _ => false,
        }
    }
}

/// Owning handle to an exchange, held by exactly one task.
///
/// Dropping it discards the exchange and removes it from the registry.
pub struct Conversation {
    inner: Arc<Exchange>,
    registry: Weak<RegistryInner>,
}

impl Conversation {
    pub(crate) fn new(inner: Arc<Exchange>, registry: Weak<RegistryInner>) -> Self {
        Self { inner, registry }
    }

    /// Conversation id.
    pub fn id(&self) -> ConversationId {
        self.inner.id
    }

    /// Destination the request was sent to.
    pub fn destination(&self) -> &str {
        &self.inner.destination
    }

    /// Protocol the request was sent with.
    pub fn protocol(&self) -> &str {
        &self.inner.protocol
    }

    fn settle(&self) {
        if !self.inner.expire_if_due(Instant::now()) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.note_expired(&self.inner);
        }
    }

    /// Current status. An exchange past its deadline is expired first.
    pub fn status(&self) -> ConversationStatus {
        self.settle();
        self.inner.state.lock().status
    }

    /// True once the exchange failed.
    pub fn is_failed(&self) -> bool {
        self.status() == ConversationStatus::Failed
    }

    /// Reason recorded with the failure, if any.
    pub fn failure_reason(&self) -> Option<String> {
        self.settle();
        self.inner.state.lock().failure.clone()
    }

    /// Number of replies received and not yet consumed.
    pub fn available_reply_count(&self) -> usize {
        self.inner.state.lock().replies.len()
    }

    /// Consumes the oldest unread reply.
    pub fn poll(&mut self) -> Option<Payload> {
        self.inner.state.lock().replies.pop_front()
    }

    /// Consumes every unread reply, oldest first.
    pub fn drain(&mut self) -> Vec<Payload> {
        self.inner.state.lock().replies.drain(..).collect()
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Conversation")
            .field("id", &self.inner.id)
            .field("destination", &self.inner.destination)
            .field("protocol", &self.inner.protocol)
            .field("status", &st.status)
            .field("replies", &st.replies.len())
            .finish()
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        {
            let mut st = self.inner.state.lock();
            st.discarded = true;
            st.replies.clear();
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.inner.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> Arc<Exchange> {
        Arc::new(Exchange::new(
            ConversationId(1),
            "index".into(),
            "search".into(),
            None,
        ))
    }

    #[tokio::test]
    async fn test_replies_are_read_in_arrival_order() {
        let ex = exchange();
        let mut conv = Conversation::new(Arc::clone(&ex), Weak::new());
        assert!(ex.push_reply(Bytes::from_static(b"a")));
        assert!(ex.push_reply(Bytes::from_static(b"b")));
        assert!(ex.push_reply(Bytes::from_static(b"c")));

        assert_eq!(conv.available_reply_count(), 3);
        assert_eq!(conv.poll().as_deref(), Some(&b"a"[..]));
        let rest = conv.drain();
        assert_eq!(rest, vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
        assert_eq!(conv.poll(), None);
    }

    #[tokio::test]
    async fn test_status_is_set_once() {
        let ex = exchange();
        let conv = Conversation::new(Arc::clone(&ex), Weak::new());
        assert_eq!(conv.status(), ConversationStatus::Pending);

        assert!(ex.conclude(ConversationStatus::Failed, Some("refused".into())));
        assert!(!ex.conclude(ConversationStatus::Succeeded, None));
        assert!(conv.is_failed());
        assert_eq!(conv.failure_reason().as_deref(), Some("refused"));
        assert!(!ex.push_reply(Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn test_drop_discards_exchange() {
        let ex = exchange();
        let conv = Conversation::new(Arc::clone(&ex), Weak::new());
        ex.push_reply(Bytes::from_static(b"unread"));
        drop(conv);

        assert!(!ex.push_reply(Bytes::from_static(b"late")));
        assert!(ex.state.lock().replies.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_expires_past_deadline_without_sweep() {
        let ex = Arc::new(Exchange::new(
            ConversationId(2),
            "index".into(),
            "search".into(),
            Some(Duration::from_secs(2)),
        ));
        let conv = Conversation::new(Arc::clone(&ex), Weak::new());

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert_eq!(conv.status(), ConversationStatus::Pending);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(conv.is_failed());
        assert_eq!(conv.failure_reason().as_deref(), Some(EXPIRED_REASON));
        assert!(!ex.expire_if_due(Instant::now()));
        assert!(!ex.push_reply(Bytes::from_static(b"late")));
    }
}
