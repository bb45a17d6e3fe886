//! # Conversation registry.
//!
//! Creates conversations, hands their requests to the [`Transport`] and routes
//! inbound replies to the right exchange. Shared by every task (clone it freely).
//!
//! ```text
//! create_conversation(dest, proto, payload)
//!   ├─► allocate id, store Weak<Exchange> in the routing table
//!   ├─► transport.send(OutboundRequest)   (never blocks)
//!   │      └─ Err ─► conversation starts out Failed
//!   └─► Conversation (owning handle) ─► task
//!
//! deliver(id, payload)          ─► append reply      (Pending only)
//! mark_succeeded / mark_failed  ─► set status once   (Pending only)
//! expire_pending(now)           ─► Pending older than ttl ─► Failed("expired")
//! ```
//!
//! ## Rules
//! - At most one exchange per id; ids are never reused
//! - Anything arriving for an unknown, discarded or concluded conversation is
//!   dropped and counted as `conversations.dropped_late`
//! - The ttl holds without a reaper: a lookup, `status` or `failure_reason` on
//!   an exchange past its deadline expires it first; the reaper only makes
//!   expiry prompt and prunes dead routing entries
//! - The table holds weak entries only; the owning task decides the lifetime

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::conversation::conversation::{
    Conversation, ConversationId, ConversationStatus, Exchange, Payload,
};
use crate::conversation::transport::{OutboundRequest, Transport};
use crate::counters::{CounterSet, names};

pub(crate) struct RegistryInner {
    table: DashMap<ConversationId, Weak<Exchange>>,
    next_id: AtomicU64,
    transport: Arc<dyn Transport>,
    counters: Arc<CounterSet>,
    ttl: Option<Duration>,
    reap_interval: Duration,
}

impl RegistryInner {
    pub(crate) fn unregister(&self, id: ConversationId) {
        if self.table.remove(&id).is_some() {
            trace!(conversation = %id, "conversation unregistered");
        }
    }

    pub(crate) fn note_expired(&self, ex: &Exchange) {
        self.counters.inc(names::CONV_EXPIRED);
        self.counters.inc(names::CONV_FAILED);
        debug!(conversation = %ex.id, destination = %ex.destination, "conversation expired");
    }

    fn lookup(&self, id: ConversationId) -> Option<Arc<Exchange>> {
        let ex = self.table.get(&id).and_then(|w| w.upgrade())?;
        if ex.expire_if_due(Instant::now()) {
            self.note_expired(&ex);
        }
        Some(ex)
    }
}

/// Creates, tracks and routes conversations.
#[derive(Clone)]
pub struct ConversationRegistry {
    inner: Arc<RegistryInner>,
}

impl ConversationRegistry {
    /// Creates a registry sending through `transport`.
    pub fn new(transport: Arc<dyn Transport>, counters: Arc<CounterSet>, cfg: &Config) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                table: DashMap::new(),
                next_id: AtomicU64::new(1),
                transport,
                counters,
                ttl: cfg.conversation_ttl(),
                reap_interval: cfg.reap_interval,
            }),
        }
    }

    /// Opens a conversation and hands its request to the transport.
    ///
    /// Never blocks and never fails: a transport that refuses the request
    /// yields a conversation that is already Failed.
    pub fn create_conversation(
        &self,
        destination: impl Into<String>,
        protocol: impl Into<String>,
        payload: Payload,
    ) -> Conversation {
        let id = ConversationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let exchange = Arc::new(Exchange::new(
            id,
            destination.into(),
            protocol.into(),
            self.inner.ttl,
        ));
        self.inner.table.insert(id, Arc::downgrade(&exchange));
        self.inner.counters.inc(names::CONV_CREATED);

        let request = OutboundRequest {
            conversation: id,
            destination: exchange.destination.clone(),
            protocol: exchange.protocol.clone(),
            payload,
        };
        match self.inner.transport.send(request) {
            Ok(token) => {
                debug!(conversation = %id, destination = %exchange.destination, delivery = token.0, "request sent");
            }
            Err(err) => {
                warn!(conversation = %id, destination = %exchange.destination, error = %err, "request not sent");
                self.inner.counters.inc(names::CONV_SEND_FAILED);
                if exchange.conclude(ConversationStatus::Failed, Some(err.to_string())) {
                    self.inner.counters.inc(names::CONV_FAILED);
                }
            }
        }

        Conversation::new(exchange, Arc::downgrade(&self.inner))
    }

    /// Appends a reply. Returns `false` if it was dropped as late.
    pub fn deliver(&self, id: ConversationId, payload: Payload) -> bool {
        let accepted = self
            .inner
            .lookup(id)
            .is_some_and(|ex| ex.push_reply(payload));
        self.count(accepted, names::CONV_DELIVERED, id, "reply");
        accepted
    }

    /// Concludes a Pending conversation successfully.
    pub fn mark_succeeded(&self, id: ConversationId) -> bool {
        let accepted = self
            .inner
            .lookup(id)
            .is_some_and(|ex| ex.conclude(ConversationStatus::Succeeded, None));
        self.count(accepted, names::CONV_SUCCEEDED, id, "success");
        accepted
    }

    /// Fails a Pending conversation.
    pub fn mark_failed(&self, id: ConversationId, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let accepted = self
            .inner
            .lookup(id)
            .is_some_and(|ex| ex.conclude(ConversationStatus::Failed, Some(reason)));
        self.count(accepted, names::CONV_FAILED, id, "failure");
        accepted
    }

    fn count(&self, accepted: bool, counter: &str, id: ConversationId, what: &'static str) {
        if accepted {
            self.inner.counters.inc(counter);
        } else {
            self.inner.counters.inc(names::CONV_DROPPED_LATE);
            debug!(conversation = %id, what, "dropped late delivery");
        }
    }

    /// Number of registered conversations (including ones whose owner is
    /// being dropped right now).
    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    /// True if no conversation is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.table.is_empty()
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: ConversationId) -> bool {
        self.inner.table.contains_key(&id)
    }

    /// Fails every Pending conversation whose deadline is at or before `now`,
    /// and prunes routing entries whose owner is gone.
    ///
    /// Returns the number of conversations expired.
    pub fn expire_pending(&self, now: Instant) -> usize {
        self.inner.table.retain(|_, w| w.strong_count() > 0);
        if self.inner.ttl.is_none() {
            return 0;
        }

        let live: Vec<Arc<Exchange>> = self
            .inner
            .table
            .iter()
            .filter_map(|e| e.value().upgrade())
            .collect();

        let mut expired = 0;
        for ex in live {
            if ex.expire_if_due(now) {
                expired += 1;
                self.inner.note_expired(&ex);
            }
        }
        expired
    }

    /// Runs [`expire_pending`](Self::expire_pending) every `reap_interval`
    /// until `token` is cancelled.
    pub fn spawn_reaper(&self, token: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        let period = self.inner.reap_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.expire_pending(Instant::now());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::conversation::transport::{ChannelTransport, DeliveryToken};
    use crate::error::TransportError;

    type Inbox = tokio::sync::mpsc::UnboundedReceiver<OutboundRequest>;

    fn registry(ttl: Duration) -> (ConversationRegistry, Arc<CounterSet>, Inbox) {
        let (transport, rx) = ChannelTransport::new();
        let counters = Arc::new(CounterSet::new());
        let cfg = Config {
            conversation_ttl: ttl,
            ..Config::default()
        };
        (
            ConversationRegistry::new(Arc::new(transport), Arc::clone(&counters), &cfg),
            counters,
            rx,
        )
    }

    struct Refusing;

    impl Transport for Refusing {
        fn send(&self, request: OutboundRequest) -> Result<DeliveryToken, TransportError> {
            Err(TransportError::UnknownDestination(request.destination))
        }
    }

    #[tokio::test]
    async fn test_create_sends_request_through_transport() {
        let (transport, mut rx) = ChannelTransport::new();
        let counters = Arc::new(CounterSet::new());
        let reg = ConversationRegistry::new(Arc::new(transport), counters.clone(), &Config::default());

        let conv = reg.create_conversation("index", "search", Bytes::from_static(b"q"));
        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.conversation, conv.id());
        assert_eq!(sent.destination, "index");
        assert_eq!(sent.payload, Bytes::from_static(b"q"));
        assert!(reg.contains(conv.id()));
        assert_eq!(counters.get(names::CONV_CREATED), 1);
    }

    #[tokio::test]
    async fn test_deliver_routes_to_owner() {
        let (reg, counters, _rx) = registry(Duration::ZERO);
        let mut a = reg.create_conversation("index", "search", Bytes::new());
        let b = reg.create_conversation("index", "search", Bytes::new());

        assert!(reg.deliver(a.id(), Bytes::from_static(b"1")));
        assert!(reg.deliver(a.id(), Bytes::from_static(b"2")));
        assert_eq!(b.available_reply_count(), 0);
        assert_eq!(a.drain(), vec![Bytes::from_static(b"1"), Bytes::from_static(b"2")]);
        assert_eq!(counters.get(names::CONV_DELIVERED), 2);
    }

    #[tokio::test]
    async fn test_late_delivery_after_discard_is_dropped() {
        let (reg, counters, _rx) = registry(Duration::ZERO);
        let conv = reg.create_conversation("index", "search", Bytes::new());
        let id = conv.id();
        drop(conv);

        assert!(!reg.contains(id));
        assert!(reg.is_empty());
        assert!(!reg.deliver(id, Bytes::from_static(b"late")));
        assert!(!reg.mark_failed(id, "late"));
        assert_eq!(counters.get(names::CONV_DROPPED_LATE), 2);
    }

    #[tokio::test]
    async fn test_status_transitions_once() {
        let (reg, counters, _rx) = registry(Duration::ZERO);
        let conv = reg.create_conversation("index", "search", Bytes::new());

        assert!(reg.mark_failed(conv.id(), "boom"));
        assert!(!reg.mark_succeeded(conv.id()));
        assert!(!reg.deliver(conv.id(), Bytes::from_static(b"after")));
        assert_eq!(conv.status(), ConversationStatus::Failed);
        assert_eq!(counters.get(names::CONV_FAILED), 1);
        assert_eq!(counters.get(names::CONV_SUCCEEDED), 0);
    }

    #[tokio::test]
    async fn test_refused_send_fails_conversation() {
        let counters = Arc::new(CounterSet::new());
        let reg = ConversationRegistry::new(Arc::new(Refusing), counters.clone(), &Config::default());
        let conv = reg.create_conversation("nowhere", "search", Bytes::new());

        assert!(conv.is_failed());
        assert_eq!(conv.failure_reason().as_deref(), Some("unknown destination: nowhere"));
        assert_eq!(counters.get(names::CONV_SEND_FAILED), 1);
        assert_eq!(counters.get(names::CONV_FAILED), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_pending_fails_old_conversations() {
        let (reg, counters, _rx) = registry(Duration::from_secs(5));
        let old = reg.create_conversation("index", "search", Bytes::new());
        time::advance(Duration::from_secs(3)).await;
        let young = reg.create_conversation("index", "search", Bytes::new());
        let done = reg.create_conversation("index", "search", Bytes::new());
        reg.mark_succeeded(done.id());

        time::advance(Duration::from_secs(4)).await;
        assert_eq!(reg.expire_pending(Instant::now()), 1);
        assert!(old.is_failed());
        assert_eq!(old.failure_reason().as_deref(), Some("expired"));
        assert_eq!(young.status(), ConversationStatus::Pending);
        assert_eq!(done.status(), ConversationStatus::Succeeded);
        assert_eq!(counters.get(names::CONV_EXPIRED), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_expires_in_background() {
        let (reg, _, _rx) = registry(Duration::from_secs(2));
        let conv = reg.create_conversation("index", "search", Bytes::new());
        let token = CancellationToken::new();
        let reaper = reg.spawn_reaper(token.clone());

        time::sleep(Duration::from_secs(4)).await;
        assert!(conv.is_failed());

        token.cancel();
        reaper.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let (reg, _, _rx) = registry(Duration::ZERO);
        let conv = reg.create_conversation("index", "search", Bytes::new());
        assert_eq!(reg.expire_pending(Instant::now() + Duration::from_secs(3600)), 0);
        assert_eq!(conv.status(), ConversationStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_holds_without_reaper() {
        let (reg, counters, _rx) = registry(Duration::from_secs(5));
        let conv = reg.create_conversation("index", "search", Bytes::new());

        time::advance(Duration::from_secs(5)).await;
        assert!(!reg.deliver(conv.id(), Bytes::from_static(b"too late")));
        assert!(conv.is_failed());
        assert_eq!(conv.failure_reason().as_deref(), Some("expired"));
        assert_eq!(counters.get(names::CONV_EXPIRED), 1);
        assert_eq!(counters.get(names::CONV_FAILED), 1);
        assert_eq!(counters.get(names::CONV_DROPPED_LATE), 1);
        assert_eq!(reg.expire_pending(Instant::now()), 0);
    }
}
