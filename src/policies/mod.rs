//! Poll cadence policies.
//!
//! Tasks that wait on a conversation defer themselves between polls. These
//! knobs control **how long** each of those defers lasts.
//!
//! ## Contents
//! - [`BackoffPolicy`] how poll delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized wake-ups
//!
//! ## Quick wiring
//! ```text
//! SearchRelayTask { poll_backoff: BackoffPolicy, polls: u32 }
//!      └─► handle_response → StateResult::defer_for(HANDLE_RESPONSE, backoff.next(polls))
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=100ms, factor=1.0 (constant), max=30s, jitter=None.
//! - `Config::default().poll_backoff` → first=10ms, factor=2.0, max=1s.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
