//! # Search envelopes.
//!
//! Shapes exchanged by the search relay, serialized as JSON:
//!
//! ```text
//! requester ── SearchRequest ──► relay ── SearchQuery{source_key, ttl, query} ──► index
//! requester ◄── SearchAnswer{answer_id, body} ── relay ◄── SearchResponse{result[]} ── index
//!
//! ttl == 1 ⇒ body = agents      : flat list of agent identifiers
//! ttl != 1 ⇒ body = agents_wide : per-result (key, ip, port, info, distance, scored agents)
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::Payload;
use crate::error::TaskError;
use crate::relay::uri::agent_part;

/// Inbound request from an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchRequest {
    /// Single-model query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Compound query; preferred over `query` when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_v2: Option<Value>,
}

/// Query carried to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryBody {
    Model(Value),
    QueryV2(Value),
}

impl SearchRequest {
    /// Picks the query to relay: the compound one if present, else the model one.
    pub fn body(&self) -> Option<QueryBody> {
        match (&self.query_v2, &self.query) {
            (Some(q), _) => Some(QueryBody::QueryV2(q.clone())),
            (None, Some(q)) => Some(QueryBody::Model(q.clone())),
            (None, None) => None,
        }
    }
}

/// Outbound query sent to the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Key of the core issuing the query.
    pub source_key: String,
    /// Remaining hop count.
    pub ttl: u16,
    pub query: QueryBody,
}

/// Agent with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoredAgent {
    pub key: String,
    #[serde(default)]
    pub score: f64,
}

/// One matched group in an index reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchResultItem {
    pub key: String,
    pub ip: String,
    pub port: u32,
    pub info: String,
    pub distance: f64,
    pub agents: Vec<ScoredAgent>,
}

/// Reply from the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchResponse {
    #[serde(default)]
    pub result: Vec<SearchResultItem>,
}

impl SearchResponse {
    /// Agent identifiers of every group, in encounter order, reduced to their
    /// agent part.
    pub fn flatten_agents(&self) -> Vec<String> {
        self.result
            .iter()
            .flat_map(|item| item.agents.iter())
            .map(|a| agent_part(&a.key).to_string())
            .collect()
    }

    /// Every group with its location, info, distance and scored agents kept as is.
    pub fn widen(&self) -> Vec<WideResult> {
        self.result.iter().map(WideResult::from).collect()
    }

    /// Total number of agents across groups.
    pub fn agent_count(&self) -> usize {
        self.result.iter().map(|item| item.agents.len()).sum()
    }
}

/// Hop-scored result forwarded to intermediate hops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideResult {
    pub key: String,
    pub ip: String,
    pub port: u32,
    pub info: String,
    pub distance: f64,
    pub agents: Vec<ScoredAgent>,
}

impl From<&SearchResultItem> for WideResult {
    fn from(item: &SearchResultItem) -> Self {
        Self {
            key: item.key.clone(),
            ip: item.ip.clone(),
            port: item.port,
            info: item.info.clone(),
            distance: item.distance,
            agents: item.agents.clone(),
        }
    }
}

/// Answer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerBody {
    /// Last hop: flat agent list.
    Agents(Vec<String>),
    /// Intermediate hop: scored results.
    AgentsWide(Vec<WideResult>),
}

impl AnswerBody {
    /// True if the answer carries no agent and no result.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerBody::Agents(a) => a.is_empty(),
            AnswerBody::AgentsWide(r) => r.is_empty(),
        }
    }
}

/// Answer forwarded to the requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAnswer {
    /// Correlation id of the original request.
    pub answer_id: i32,
    pub body: AnswerBody,
}

/// Serializes an envelope.
pub fn encode<T: Serialize>(value: &T) -> Result<Payload, TaskError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| TaskError::Malformed {
            reason: e.to_string(),
        })
}

/// Deserializes an envelope.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, TaskError> {
    serde_json::from_slice(payload).map_err(|e| TaskError::Decode {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group(key: &str, agents: &[(&str, f64)]) -> SearchResultItem {
        SearchResultItem {
            key: key.into(),
            ip: "10.0.0.1".into(),
            port: 3333,
            info: "info".into(),
            distance: 1.5,
            agents: agents
                .iter()
                .map(|(k, s)| ScoredAgent {
                    key: (*k).into(),
                    score: *s,
                })
                .collect(),
        }
    }

    #[test]
    fn test_compound_query_wins() {
        let req = SearchRequest {
            query: Some(json!({"model": "weather"})),
            query_v2: Some(json!({"root": "and"})),
        };
        assert_eq!(req.body(), Some(QueryBody::QueryV2(json!({"root": "and"}))));

        let req = SearchRequest {
            query: Some(json!({"model": "weather"})),
            query_v2: None,
        };
        assert_eq!(req.body(), Some(QueryBody::Model(json!({"model": "weather"}))));
        assert_eq!(SearchRequest::default().body(), None);
    }

    #[test]
    fn test_flatten_keeps_encounter_order() {
        let resp = SearchResponse {
            result: vec![
                group("G1", &[("a1", 0.1), ("a2", 0.2)]),
                group("G2", &[("core/a3", 0.3)]),
            ],
        };
        assert_eq!(resp.flatten_agents(), vec!["a1", "a2", "a3"]);
        assert_eq!(resp.agent_count(), 3);
    }

    #[test]
    fn test_widen_keeps_fields() {
        let resp = SearchResponse {
            result: vec![group("K", &[("a1", 0.9), ("a2", 0.4)])],
        };
        let wide = resp.widen();
        assert_eq!(wide.len(), 1);
        assert_eq!(wide[0].key, "K");
        assert_eq!(wide[0].ip, "10.0.0.1");
        assert_eq!(wide[0].port, 3333);
        assert_eq!(wide[0].info, "info");
        assert_eq!(wide[0].distance, 1.5);
        assert_eq!(wide[0].agents, resp.result[0].agents);
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let resp: SearchResponse = decode(br#"{"result":[{"key":"K","agents":[{"key":"a"}]}]}"#).unwrap();
        assert_eq!(resp.result[0].port, 0);
        assert_eq!(resp.result[0].agents[0].score, 0.0);
        let empty: SearchResponse = decode(b"{}").unwrap();
        assert!(empty.result.is_empty());
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = decode::<SearchResponse>(b"not json").unwrap_err();
        assert!(matches!(err, TaskError::Decode { .. }));
    }

    #[test]
    fn test_answer_wire_shape() {
        let answer = SearchAnswer {
            answer_id: 7,
            body: AnswerBody::Agents(vec!["a1".into()]),
        };
        let v: Value = serde_json::from_slice(&encode(&answer).unwrap()).unwrap();
        assert_eq!(v, json!({"answer_id": 7, "body": {"agents": ["a1"]}}));
    }
}
