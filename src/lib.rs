//! # parley
//!
//! **Parley** is the task-execution core of an agent-communication broker.
//!
//! It lets the broker issue a request to an external service, suspend while
//! waiting for the asynchronous reply, and resume, possibly several times,
//! until the exchange completes, fails or times out. No thread or tokio task
//! is parked per request: suspension is an explicit `Defer` returned by a
//! resumable task.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   protocol handler                           transport collaborator
//!        │ submit(SearchRelayTask)                 ▲ send        │ deliver / mark_*
//!        ▼                                         │             ▼
//! ┌───────────────────────────────┐      ┌──────────────────────────────────┐
//! │ Scheduler                     │      │ ConversationRegistry             │
//! │  ready queue ──► workers (N)  │      │  id ──► Weak<Exchange>           │
//! │  timer (deferred set)         │      │  reaper: Pending past ttl→Failed │
//! │  live table, Bus, CounterSet  │      └──────────────▲───────────────────┘
//! └──────────────┬────────────────┘                     │ create_conversation / poll
//!                ▼ run_once(entry point)                │
//!        ┌──────────────────────────────────────────────┴─┐
//!        │ Task (entry-point table + current index)       │
//!        │  SearchRelayTask: create_conv → handle_response│
//!        │  HeartbeatTask:   beat (every period)          │
//!        └────────────────────────────────────────────────┘
//!                ▼ publish(Event)
//!               Bus ──► listener ──► SubscriberSet ──► LogWriter / custom
//! ```
//!
//! ### Lifecycle of a task
//! ```text
//! submit ──► TaskSubmitted ──► ready queue
//!
//! loop {
//!   worker pops job, runs entry point at `index` (panics contained)
//!     ├─ Defer(next, None)     ─► index = next, back of the ready queue
//!     ├─ Defer(next, Some(d))  ─► index = next, timer, ready again at now + d
//!     ├─ Complete              ─► retire: TaskCompleted
//!     └─ Errored / Err(e)      ─► retire: TaskErrored
//! }
//!
//! retire: release conversation (count a leak if replies are unread),
//!         destroy task, update counters, remove from live table
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types                                   |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------|
//! | **Tasks**         | Resumable state machines with named entry points.                | [`Task`], [`EntryPoint`], [`StateResult`]   |
//! | **Scheduling**    | Worker pool, deferred timer, cancellation, graceful shutdown.    | [`Scheduler`], [`SchedulerHandle`]          |
//! | **Conversations** | Outbound requests and their replies, routed by id.               | [`ConversationRegistry`], [`Conversation`]  |
//! | **Relay**         | Search relay with flat or hop-scored answers.                    | [`SearchRelayTask`], [`relay::envelope`]    |
//! | **Liveness**      | Self-rescheduling heartbeat on a weak endpoint reference.        | [`HeartbeatTask`], [`AgentEndpoint`]        |
//! | **Observability** | Runtime events, subscribers, named counters.                     | [`Event`], [`Subscribe`], [`CounterSet`]    |
//! | **Errors**        | Typed errors for runtime, tasks, transport and forwarding.       | [`RuntimeError`], [`TaskError`]             |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use parley::{
//!     ChannelForwarder, ChannelTransport, Config, ConversationRegistry, CounterSet,
//!     Scheduler, SearchParams, SearchRelayTask,
//!     relay::envelope::{self, SearchRequest, SearchResponse},
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.workers = 1;
//!     let counters = Arc::new(CounterSet::new());
//!
//!     let (transport, mut outbound) = ChannelTransport::new();
//!     let registry = ConversationRegistry::new(Arc::new(transport), counters.clone(), &cfg);
//!     let (forwarder, mut answers) = ChannelForwarder::new();
//!     let scheduler = Scheduler::builder(cfg.clone()).with_counters(counters.clone()).build();
//!
//!     let params = SearchParams {
//!         request: SearchRequest { query: Some(serde_json::json!({"model": "weather"})), query_v2: None },
//!         msg_id: 1,
//!         core_key: "core-1".into(),
//!         agent_uri: "agent-1".into(),
//!         ttl: 1,
//!         destination: "search".into(),
//!     };
//!     let task = SearchRelayTask::new(params, registry.clone(), counters.clone(), &cfg)
//!         .with_forward(Arc::new(forwarder));
//!     scheduler.submit(task)?;
//!
//!     // Play the search index.
//!     let request = outbound.recv().await.ok_or("transport closed")?;
//!     registry.deliver(request.conversation, envelope::encode(&SearchResponse::default())?);
//!
//!     let answer = answers.recv().await.ok_or("no answer")?;
//!     assert_eq!(answer.endpoint, "agent-1");
//!     scheduler.wait_idle().await;
//!     scheduler.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod conversation;
mod core;
mod counters;
mod error;
mod events;
mod heartbeat;
mod policies;
pub mod relay;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use config::Config;
pub use conversation::{
    ChannelTransport, Conversation, ConversationId, ConversationRegistry, ConversationStatus,
    DeliveryToken, OutboundRequest, Payload, Transport,
};
pub use crate::core::{Scheduler, SchedulerBuilder, SchedulerHandle};
pub use counters::{CounterSet, names};
pub use error::{ForwardError, RuntimeError, TaskError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use heartbeat::{AgentEndpoint, HeartbeatTask};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use relay::{ChannelForwarder, Forward, ForwardedAnswer, SearchParams, SearchRelayTask};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{
    EntryFn, EntryPoint, Outcome, StateResult, Task, TaskContext, TaskFn, TaskId, TaskSpec,
    entry_index,
};
