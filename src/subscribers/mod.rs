//! # Event subscribers.
//!
//! ```text
//! Worker ── publish(Event) ──► Bus ──► Scheduler listener ──► SubscriberSet
//!                                                                 │
//!                                                  ┌──────────────┼──────────┐
//!                                                  ▼              ▼          ▼
//!                                              LogWriter      Metrics     Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use parley::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct Alerts;
//!
//! #[async_trait]
//! impl Subscribe for Alerts {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::ConversationLeaked {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "alerts" }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
