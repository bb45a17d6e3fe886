//! # Demo: search_relay
//!
//! Runs the broker core in-process: a fake search index answers relayed
//! queries, a heartbeat keeps a fake agent connection alive, and every runtime
//! event is logged through [`LogWriter`].
//!
//! ## Flow
//! ```text
//! main ──► submit(SearchRelayTask × 3) ──► create_conv ──► ChannelTransport
//!                                                             │
//!                                    fake index ◄─────────────┘
//!                                        │ deliver(reply) / mark_failed
//!                                        ▼
//!              handle_response ──► ChannelForwarder ──► printed answers
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=parley=debug cargo run --example search_relay
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parley::relay::envelope::{self, ScoredAgent, SearchQuery, SearchRequest, SearchResponse, SearchResultItem};
use parley::{
    AgentEndpoint, ChannelForwarder, ChannelTransport, Config, ConversationRegistry, CounterSet,
    HeartbeatTask, LogWriter, Scheduler, SearchParams, SearchRelayTask, Subscribe,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct AgentConnection {
    pings: AtomicU32,
}

impl AgentEndpoint for AgentConnection {
    fn id(&self) -> &str {
        "agent-connection"
    }

    fn heartbeat(&self) {
        let n = self.pings.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[agent] ping #{n}");
    }
}

fn index_reply(query: &SearchQuery) -> SearchResponse {
    let agent = |key: &str, score: f64| ScoredAgent {
        key: format!("oef://{}/{key}", query.source_key),
        score,
    };
    SearchResponse {
        result: vec![
            SearchResultItem {
                key: "core-weather".into(),
                ip: "127.0.0.1".into(),
                port: 10000,
                info: "weather stations".into(),
                distance: 3.5,
                agents: vec![agent("station-1", 0.9), agent("station-2", 0.7)],
            },
            SearchResultItem {
                key: "core-traffic".into(),
                ip: "127.0.0.2".into(),
                port: 10001,
                info: "traffic sensors".into(),
                distance: 8.0,
                agents: vec![agent("sensor-9", 0.4)],
            },
        ],
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley=info")),
        )
        .init();

    let cfg = Config {
        workers: 2,
        conversation_ttl: Duration::from_secs(2),
        heartbeat_period: Duration::from_millis(300),
        ..Config::default()
    };
    let counters = Arc::new(CounterSet::new());

    let (transport, mut outbound) = ChannelTransport::new();
    let registry = ConversationRegistry::new(Arc::new(transport), counters.clone(), &cfg);
    let (forwarder, mut answers) = ChannelForwarder::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let scheduler = Scheduler::builder(cfg.clone())
        .with_subscribers(subs)
        .with_counters(counters.clone())
        .build();

    let token = CancellationToken::new();
    let reaper = registry.spawn_reaper(token.clone());

    // Fake search index: answers every query, fails the ones with ttl 0.
    let index_registry = registry.clone();
    let index = tokio::spawn(async move {
        while let Some(request) = outbound.recv().await {
            let Ok(query) = envelope::decode::<SearchQuery>(&request.payload) else {
                index_registry.mark_failed(request.conversation, "undecodable query");
                continue;
            };
            tokio::time::sleep(Duration::from_millis(150)).await;
            if query.ttl == 0 {
                index_registry.mark_failed(request.conversation, "ttl exhausted");
                continue;
            }
            match envelope::encode(&index_reply(&query)) {
                Ok(reply) => {
                    index_registry.deliver(request.conversation, reply);
                    index_registry.mark_succeeded(request.conversation);
                }
                Err(e) => {
                    index_registry.mark_failed(request.conversation, e.to_string());
                }
            }
        }
    });

    let connection: Arc<dyn AgentEndpoint> = Arc::new(AgentConnection {
        pings: AtomicU32::new(0),
    });
    scheduler.submit(HeartbeatTask::from_config(&connection, &cfg))?;

    for (msg_id, ttl) in [(1, 1), (2, 3), (3, 0)] {
        let params = SearchParams {
            request: SearchRequest {
                query: Some(json!({"model": "weather", "attributes": ["temp", "wind"]})),
                query_v2: None,
            },
            msg_id,
            core_key: "core-1".into(),
            agent_uri: format!("agent-{msg_id}"),
            ttl,
            destination: "search".into(),
        };
        let task = SearchRelayTask::new(params, registry.clone(), counters.clone(), &cfg)
            .with_forward(Arc::new(forwarder.clone()));
        scheduler.submit(task)?;
    }

    for _ in 0..2 {
        let Some(answer) = answers.recv().await else {
            break;
        };
        println!("[requester] {} <- {}", answer.endpoint, String::from_utf8_lossy(&answer.payload));
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(connection);
    scheduler.wait_idle().await;

    token.cancel();
    let _ = reaper.await;
    index.abort();
    scheduler.shutdown().await?;

    for (name, value) in counters.snapshot() {
        println!("{name:<40} {value}");
    }
    Ok(())
}
