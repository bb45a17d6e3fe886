//! Runtime core: dispatch and lifecycle.
//!
//! The only public API from this module is [`Scheduler`] (with its builder and
//! cloneable [`SchedulerHandle`]).
//!
//! Internal modules:
//! - [`scheduler`]: live table, dispatch decisions, retirement, shutdown;
//! - [`worker`]: pool draining the ready queue;
//! - [`timer`]: deferred set and delayed wake-ups;
//! - [`runner`]: executes one entry-point invocation with panic containment;
//! - [`job`]: per-task bookkeeping moved between queue, worker and timer;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod job;
mod runner;
mod scheduler;
mod shutdown;
mod timer;
mod worker;

pub use builder::SchedulerBuilder;
pub use scheduler::{Scheduler, SchedulerHandle};

pub(crate) use runner::panic_message;
