//! # Search relay task.
//!
//! Relays an agent's search to the index service and hands the translated
//! answer back to the agent.
//!
//! ```text
//! [0] create_conv     build SearchQuery{source_key, ttl, query}
//!                     registry.create_conversation(...)   ──► Defer(handle_response)
//!
//! [1] handle_response failed?               ──► Err(Transport)        (no retry)
//!                     no reply, pending     ──► Defer(handle_response, backoff)
//!                     no reply, succeeded   ──► Err(Transport)
//!                     first reply ──► decode ──► ttl == 1 ? flatten : widen
//!                                 ──► forward to requester (best effort) ──► Complete
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::conversation::{Conversation, ConversationRegistry, ConversationStatus};
use crate::counters::{CounterSet, names};
use crate::error::TaskError;
use crate::policies::BackoffPolicy;
use crate::relay::envelope::{
    self, AnswerBody, SearchAnswer, SearchQuery, SearchRequest, SearchResponse,
};
use crate::relay::forward::Forward;
use crate::tasks::{EntryPoint, StateResult, Task, TaskContext};

/// Protocol name of search conversations.
pub const SEARCH_PROTOCOL: &str = "search";

const HANDLE_RESPONSE: usize = 1;

static SEARCH_RELAY_ENTRIES: [EntryPoint<SearchRelayTask>; 2] = [
    EntryPoint::new("create_conv", SearchRelayTask::create_conv),
    EntryPoint::new("handle_response", SearchRelayTask::handle_response),
];

/// What to relay and where the answer goes.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Request received from the agent.
    pub request: SearchRequest,
    /// Correlation id of the request; becomes the answer id.
    pub msg_id: u32,
    /// Key of this core, sent as the query's source.
    pub core_key: String,
    /// Requester endpoint the answer is forwarded to.
    pub agent_uri: String,
    /// Remaining hop count.
    pub ttl: u16,
    /// Search service the query is sent to.
    pub destination: String,
}

/// Relays one search request.
pub struct SearchRelayTask {
    params: SearchParams,
    registry: ConversationRegistry,
    counters: Arc<CounterSet>,
    forward: Option<Arc<dyn Forward>>,
    backoff: BackoffPolicy,
    polls: u32,
    conversation: Option<Conversation>,
}

impl SearchRelayTask {
    /// Creates the task; polls use `cfg.poll_backoff`.
    pub fn new(
        params: SearchParams,
        registry: ConversationRegistry,
        counters: Arc<CounterSet>,
        cfg: &Config,
    ) -> Self {
        counters.inc(names::SEARCH_CREATED);
        Self {
            params,
            registry,
            counters,
            forward: None,
            backoff: cfg.poll_backoff,
            polls: 0,
            conversation: None,
        }
    }

    /// Sets the channel answers are forwarded through.
    ///
    /// Without one the task still completes, counted as unreplied.
    pub fn with_forward(mut self, forward: Arc<dyn Forward>) -> Self {
        self.forward = Some(forward);
        self
    }

    fn create_conv(&mut self, _ctx: &mut TaskContext) -> Result<StateResult, TaskError> {
        let query = SearchQuery {
            source_key: self.params.core_key.clone(),
            ttl: self.params.ttl,
            query: self.params.request.body().ok_or_else(|| TaskError::Malformed {
                reason: "search request carries no query".to_string(),
            })?,
        };
        let payload = envelope::encode(&query)?;

        let conv = self.registry.create_conversation(
            self.params.destination.as_str(),
            SEARCH_PROTOCOL,
            payload,
        );
        debug!(
            conversation = %conv.id(), msg_id = self.params.msg_id, ttl = self.params.ttl,
            "search query sent"
        );
        self.conversation = Some(conv);
        Ok(StateResult::defer(HANDLE_RESPONSE))
    }

    fn handle_response(&mut self, _ctx: &mut TaskContext) -> Result<StateResult, TaskError> {
        let Some(conv) = self.conversation.as_mut() else {
            return Err(TaskError::Malformed {
                reason: "no search conversation to poll".to_string(),
            });
        };

        if conv.is_failed() {
            let reason = conv
                .failure_reason()
                .unwrap_or_else(|| "search call failed".to_string());
            warn!(conversation = %conv.id(), %reason, "search call returned error");
            return Err(TaskError::Transport {
                conversation: conv.id().get(),
                reason,
            });
        }

        let reply = match conv.poll() {
            Some(reply) => reply,
            None if conv.status() == ConversationStatus::Succeeded => {
                return Err(TaskError::Transport {
                    conversation: conv.id().get(),
                    reason: "concluded without a reply".to_string(),
                });
            }
            None => {
                let delay = self.backoff.next(self.polls);
                self.polls = self.polls.saturating_add(1);
                return Ok(StateResult::defer_for(HANDLE_RESPONSE, delay));
            }
        };

        let response: SearchResponse = envelope::decode(&reply)?;
        self.conversation = None;

        let answer = self.translate(&response)?;
        self.reply(&answer);
        Ok(StateResult::complete())
    }

    fn translate(&self, response: &SearchResponse) -> Result<SearchAnswer, TaskError> {
        let answer_id = i32::try_from(self.params.msg_id).map_err(|_| TaskError::Malformed {
            reason: format!("message id {} does not fit an answer id", self.params.msg_id),
        })?;
        let body = if self.params.ttl == 1 {
            AnswerBody::Agents(response.flatten_agents())
        } else {
            AnswerBody::AgentsWide(response.widen())
        };

        if response.result.is_empty() {
            warn!(agent = %self.params.agent_uri, msg_id = self.params.msg_id, "empty search result");
        } else {
            self.counters.inc(names::SEARCH_SUCCEEDED);
            info!(
                agent = %self.params.agent_uri, agents = response.agent_count(),
                wide = self.params.ttl != 1, "sending search answer"
            );
        }

        Ok(SearchAnswer { answer_id, body })
    }

    fn reply(&self, answer: &SearchAnswer) {
        let Some(forward) = &self.forward else {
            self.counters.inc(names::SEARCH_UNREPLIED);
            warn!(agent = %self.params.agent_uri, "no forwarding channel");
            return;
        };

        let sent = envelope::encode(answer)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                forward
                    .forward(payload, &self.params.agent_uri)
                    .map_err(|e| e.to_string())
            });
        match sent {
            Ok(()) => self.counters.inc(names::SEARCH_REPLIED),
            Err(reason) => {
                self.counters.inc(names::SEARCH_UNREPLIED);
                warn!(agent = %self.params.agent_uri, %reason, "search answer not forwarded");
            }
        }
    }
}

impl Task for SearchRelayTask {
    fn name(&self) -> &str {
        "search-relay"
    }

    fn entry_points(&self) -> &[EntryPoint<Self>] {
        &SEARCH_RELAY_ENTRIES
    }

    fn take_conversation(&mut self) -> Option<Conversation> {
        self.conversation.take()
    }
}

impl Drop for SearchRelayTask {
    fn drop(&mut self) {
        self.counters.inc(names::SEARCH_RESOLVED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::conversation::{ChannelTransport, OutboundRequest};
    use crate::relay::envelope::{ScoredAgent, SearchResultItem};
    use crate::relay::forward::{ChannelForwarder, ForwardedAnswer};
    use crate::tasks::{Outcome, TaskId};

    struct Harness {
        registry: ConversationRegistry,
        counters: Arc<CounterSet>,
        outbound: mpsc::UnboundedReceiver<OutboundRequest>,
        answers: mpsc::UnboundedReceiver<ForwardedAnswer>,
        task: SearchRelayTask,
        ctx: TaskContext,
    }

    fn harness(ttl: u16, request: SearchRequest) -> Harness {
        harness_with_id(ttl, 42, request)
    }

    fn harness_with_id(ttl: u16, msg_id: u32, request: SearchRequest) -> Harness {
        let (transport, outbound) = ChannelTransport::new();
        let (forwarder, answers) = ChannelForwarder::new();
        let counters = Arc::new(CounterSet::new());
        let cfg = Config::default();
        let registry = ConversationRegistry::new(Arc::new(transport), counters.clone(), &cfg);
        let params = SearchParams {
            request,
            msg_id,
            core_key: "core-1".into(),
            agent_uri: "agent-7".into(),
            ttl,
            destination: "search-index".into(),
        };
        let task = SearchRelayTask::new(params, registry.clone(), counters.clone(), &cfg)
            .with_forward(Arc::new(forwarder));
        Harness {
            registry,
            counters,
            outbound,
            answers,
            task,
            ctx: TaskContext::detached(TaskId(1)),
        }
    }

    fn model_request() -> SearchRequest {
        SearchRequest {
            query: Some(json!({"model": "weather"})),
            query_v2: None,
        }
    }

    fn reply(result: Vec<SearchResultItem>) -> Bytes {
        envelope::encode(&SearchResponse { result }).unwrap()
    }

    #[tokio::test]
    async fn test_create_conv_sends_query_and_defers() {
        let mut h = harness(3, model_request());
        let r = h.task.create_conv(&mut h.ctx).unwrap();
        assert_eq!(r, StateResult::defer(HANDLE_RESPONSE));

        let sent = h.outbound.try_recv().unwrap();
        assert_eq!(sent.destination, "search-index");
        assert_eq!(sent.protocol, SEARCH_PROTOCOL);
        let query: SearchQuery = envelope::decode(&sent.payload).unwrap();
        assert_eq!(query.source_key, "core-1");
        assert_eq!(query.ttl, 3);
        assert_eq!(h.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_request_without_query_is_malformed() {
        let mut h = harness(1, SearchRequest::default());
        let err = h.task.create_conv(&mut h.ctx).unwrap_err();
        assert!(matches!(err, TaskError::Malformed { .. }));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_pending_without_reply_defers_with_backoff() {
        let mut h = harness(1, model_request());
        h.task.create_conv(&mut h.ctx).unwrap();

        let first = h.task.handle_response(&mut h.ctx).unwrap();
        let second = h.task.handle_response(&mut h.ctx).unwrap();
        assert_eq!(first.next, HANDLE_RESPONSE);
        let backoff = Config::default().poll_backoff;
        assert_eq!(first.outcome, Outcome::Defer(Some(backoff.next(0))));
        assert_eq!(second.outcome, Outcome::Defer(Some(backoff.next(1))));
        assert!(backoff.next(1) > backoff.next(0));
    }

    #[tokio::test]
    async fn test_failure_dominates_buffered_replies() {
        let mut h = harness(1, model_request());
        h.task.create_conv(&mut h.ctx).unwrap();
        let id = h.outbound.try_recv().unwrap().conversation;

        h.registry.deliver(id, reply(vec![]));
        h.registry.mark_failed(id, "index unavailable");
        let err = h.task.handle_response(&mut h.ctx).unwrap_err();
        assert_eq!(
            err,
            TaskError::Transport {
                conversation: id.get(),
                reason: "index unavailable".into()
            }
        );
        assert!(h.answers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_succeeded_without_reply_errors() {
        let mut h = harness(1, model_request());
        h.task.create_conv(&mut h.ctx).unwrap();
        let id = h.outbound.try_recv().unwrap().conversation;

        h.registry.mark_succeeded(id);
        assert!(matches!(
            h.task.handle_response(&mut h.ctx),
            Err(TaskError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_last_hop_flattens_and_forwards() {
        let mut h = harness(1, model_request());
        h.task.create_conv(&mut h.ctx).unwrap();
        let id = h.outbound.try_recv().unwrap().conversation;

        let agent = |k: &str| ScoredAgent {
            key: k.into(),
            score: 0.5,
        };
        h.registry.deliver(
            id,
            reply(vec![
                SearchResultItem {
                    key: "G1".into(),
                    agents: vec![agent("a1"), agent("a2")],
                    ..Default::default()
                },
                SearchResultItem {
                    key: "G2".into(),
                    agents: vec![agent("a3")],
                    ..Default::default()
                },
            ]),
        );

        let r = h.task.handle_response(&mut h.ctx).unwrap();
        assert_eq!(r.outcome, Outcome::Complete);
        assert!(h.registry.is_empty());

        let fwd = h.answers.try_recv().unwrap();
        assert_eq!(fwd.endpoint, "agent-7");
        let answer: SearchAnswer = envelope::decode(&fwd.payload).unwrap();
        assert_eq!(answer.answer_id, 42);
        assert_eq!(
            answer.body,
            AnswerBody::Agents(vec!["a1".into(), "a2".into(), "a3".into()])
        );
        assert_eq!(h.counters.get(names::SEARCH_REPLIED), 1);
        assert_eq!(h.counters.get(names::SEARCH_SUCCEEDED), 1);
    }

    #[tokio::test]
    async fn test_empty_result_still_answers() {
        let mut h = harness(4, model_request());
        h.task.create_conv(&mut h.ctx).unwrap();
        let id = h.outbound.try_recv().unwrap().conversation;
        h.registry.deliver(id, reply(vec![]));

        assert!(h.task.handle_response(&mut h.ctx).unwrap().is_terminal());
        let answer: SearchAnswer = envelope::decode(&h.answers.try_recv().unwrap().payload).unwrap();
        assert_eq!(answer.body, AnswerBody::AgentsWide(vec![]));
        assert_eq!(h.counters.get(names::SEARCH_SUCCEEDED), 0);
        assert_eq!(h.counters.get(names::SEARCH_REPLIED), 1);
    }

    #[tokio::test]
    async fn test_missing_forwarder_completes_unreplied() {
        let (transport, mut outbound) = ChannelTransport::new();
        let counters = Arc::new(CounterSet::new());
        let cfg = Config::default();
        let registry = ConversationRegistry::new(Arc::new(transport), counters.clone(), &cfg);
        let params = SearchParams {
            request: model_request(),
            msg_id: 1,
            core_key: "core-1".into(),
            agent_uri: "agent-1".into(),
            ttl: 1,
            destination: "search-index".into(),
        };
        let mut task = SearchRelayTask::new(params, registry.clone(), counters.clone(), &cfg);
        let mut ctx = TaskContext::detached(TaskId(1));

        task.create_conv(&mut ctx).unwrap();
        registry.deliver(outbound.try_recv().unwrap().conversation, reply(vec![]));
        assert_eq!(task.handle_response(&mut ctx).unwrap(), StateResult::complete());
        assert_eq!(counters.get(names::SEARCH_UNREPLIED), 1);

        drop(task);
        assert_eq!(counters.get(names::SEARCH_CREATED), 1);
        assert_eq!(counters.get(names::SEARCH_RESOLVED), 1);
    }

    #[tokio::test]
    async fn test_message_id_beyond_answer_range_is_malformed() {
        let mut h = harness_with_id(1, u32::MAX, model_request());
        h.task.create_conv(&mut h.ctx).unwrap();
        let id = h.outbound.try_recv().unwrap().conversation;
        h.registry.deliver(id, reply(vec![]));

        let err = h.task.handle_response(&mut h.ctx).unwrap_err();
        assert!(matches!(err, TaskError::Malformed { .. }));
        assert!(h.answers.try_recv().is_err());
        assert_eq!(h.counters.get(names::SEARCH_REPLIED), 0);
        assert_eq!(h.counters.get(names::SEARCH_UNREPLIED), 0);
    }
}
