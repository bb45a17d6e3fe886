//! # Conversations: outstanding exchanges with external services.
//!
//! - [`Conversation`] - owning handle polled by exactly one task
//! - [`ConversationRegistry`] - creates conversations and routes replies
//! - [`Transport`] / [`ChannelTransport`] - outbound side of the transport collaborator

#[allow(clippy::module_inception)]
mod conversation;
mod registry;
mod transport;

pub use conversation::{Conversation, ConversationId, ConversationStatus, Payload};
pub use registry::ConversationRegistry;
pub use transport::{ChannelTransport, DeliveryToken, OutboundRequest, Transport};
