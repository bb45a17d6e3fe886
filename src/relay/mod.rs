//! # Search relay.
//!
//! - [`SearchRelayTask`] - two-state task relaying a search to the index
//! - [`envelope`] - request/query/response/answer shapes (serde JSON)
//! - [`Forward`] / [`ChannelForwarder`] - hands answers back to the requester
//! - [`agent_part`] - agent-URI reduction used when flattening

pub mod envelope;
mod forward;
mod search;
mod uri;

pub use forward::{ChannelForwarder, Forward, ForwardedAnswer};
pub use search::{SEARCH_PROTOCOL, SearchParams, SearchRelayTask};
pub use uri::agent_part;
