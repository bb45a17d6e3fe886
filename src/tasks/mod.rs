//! # Task abstractions and specifications.
//!
//! This module provides the core task-related types:
//! - [`Task`] - resumable state machine with a fixed entry-point table
//! - [`EntryPoint`] - one named state (handler function)
//! - [`StateResult`] / [`Outcome`] - what a handler tells the scheduler
//! - [`TaskContext`] - per-invocation context (id, entry, counts, child submission)
//! - [`TaskFn`] - closure-backed single-entry task
//! - [`TaskSpec`] - task bundled with its defer budget

mod context;
mod spec;
mod state;
mod task;
mod task_fn;

pub use context::TaskContext;
pub use spec::TaskSpec;
pub use state::{Outcome, StateResult};
pub use task::{EntryFn, EntryPoint, Task, TaskId, entry_index};
pub use task_fn::TaskFn;

pub(crate) use task::Runnable;
