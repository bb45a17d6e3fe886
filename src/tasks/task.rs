//! # Resumable task abstraction.
//!
//! A [`Task`] is a state machine whose states are **entry points**: named
//! handlers listed in a fixed table. The scheduler keeps the index of the entry
//! point to run next and calls it; the handler performs at most one
//! side-effecting step and returns a [`StateResult`].
//!
//! Handlers are plain synchronous functions. They must never block: a handler
//! whose precondition is not met yet returns a Defer instead of waiting.
//! Successive invocations of one task instance never overlap, so handlers take
//! `&mut self` and need no locking of their own.
//!
//! # Example
//! ```
//! use parley::{EntryPoint, StateResult, Task, TaskContext, TaskError};
//!
//! struct Countdown { left: u32 }
//!
//! impl Countdown {
//!     fn tick(&mut self, _ctx: &mut TaskContext) -> Result<StateResult, TaskError> {
//!         if self.left == 0 {
//!             return Ok(StateResult::complete());
//!         }
//!         self.left -= 1;
//!         Ok(StateResult::defer(0))
//!     }
//! }
//!
//! static COUNTDOWN: [EntryPoint<Countdown>; 1] = [EntryPoint::new("tick", Countdown::tick)];
//!
//! impl Task for Countdown {
//!     fn name(&self) -> &str { "countdown" }
//!     fn entry_points(&self) -> &[EntryPoint<Self>] { &COUNTDOWN }
//! }
//! ```

use std::fmt;

use crate::conversation::Conversation;
use crate::error::TaskError;
use crate::tasks::context::TaskContext;
use crate::tasks::state::StateResult;

/// Scheduler-assigned task handle, unique for the scheduler's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// Raw numeric id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Entry-point handler signature.
pub type EntryFn<T> = fn(&mut T, &mut TaskContext) -> Result<StateResult, TaskError>;

/// One named state of a task.
pub struct EntryPoint<T> {
    name: &'static str,
    run: EntryFn<T>,
}

impl<T> EntryPoint<T> {
    /// Builds an entry point; usable in `static` tables.
    pub const fn new(name: &'static str, run: EntryFn<T>) -> Self {
        Self { name, run }
    }

    /// State name (for logs and events).
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for EntryPoint<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntryPoint<T> {}

/// Position of the entry point called `name` in `table`.
pub fn entry_index<T>(table: &[EntryPoint<T>], name: &str) -> Option<usize> {
    table.iter().position(|e| e.name == name)
}

/// Resumable unit of work.
pub trait Task: Send + Sized + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Ordered entry-point table. Must not change over the task's lifetime.
    fn entry_points(&self) -> &[EntryPoint<Self>];

    /// Hands over the conversation this task still holds, if any.
    ///
    /// Called by the scheduler when the task is retired so the conversation is
    /// unregistered and undrained replies are reported.
    fn take_conversation(&mut self) -> Option<Conversation> {
        None
    }
}

/// Object-safe view of a [`Task`] used by the scheduler.
pub(crate) trait Runnable: Send {
    fn name(&self) -> &str;
    fn entry_count(&self) -> usize;
    fn entry_name(&self, index: usize) -> Option<&'static str>;
    fn invoke(&mut self, index: usize, ctx: &mut TaskContext) -> Result<StateResult, TaskError>;
    fn take_conversation(&mut self) -> Option<Conversation>;
}

impl<T: Task> Runnable for T {
    fn name(&self) -> &str {
        Task::name(self)
    }

    fn entry_count(&self) -> usize {
        self.entry_points().len()
    }

    fn entry_name(&self, index: usize) -> Option<&'static str> {
        self.entry_points().get(index).map(EntryPoint::name)
    }

    fn invoke(&mut self, index: usize, ctx: &mut TaskContext) -> Result<StateResult, TaskError> {
        let entry = self
            .entry_points()
            .get(index)
            .copied()
            .ok_or(TaskError::InvalidEntry {
                index,
                available: self.entry_points().len(),
            })?;
        (entry.run)(self, ctx)
    }

    fn take_conversation(&mut self) -> Option<Conversation> {
        Task::take_conversation(self)
    }
}
