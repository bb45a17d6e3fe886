//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Scheduler` (submit/shutdown), dispatch workers (defer and
//!   terminal outcomes), the deferred timer (cancellations), `SubscriberSet`
//!   workers (overflow/panic).
//! - **Consumers**: the scheduler's event listener, which fans out to the
//!   `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
