//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: FnMut(&mut TaskContext) -> Result<StateResult, TaskError>`
//! as a task with a single entry point named `"run"`. The closure owns whatever
//! state it captures; every invocation runs it once.
//!
//! ## Example
//! ```rust
//! use parley::{StateResult, TaskContext, TaskError, TaskFn};
//!
//! let mut left = 3;
//! let t = TaskFn::new("poller", move |_ctx: &mut TaskContext| {
//!     left -= 1;
//!     if left == 0 {
//!         Ok::<_, TaskError>(StateResult::complete())
//!     } else {
//!         Ok(StateResult::defer(0))
//!     }
//! });
//! assert_eq!(parley::Task::name(&t), "poller");
//! ```

use std::borrow::Cow;

use crate::error::TaskError;
use crate::tasks::context::TaskContext;
use crate::tasks::state::StateResult;
use crate::tasks::task::{EntryPoint, Task};

/// Closure-backed single-entry task.
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
    entry: [EntryPoint<Self>; 1],
}

impl<F> TaskFn<F>
where
    F: FnMut(&mut TaskContext) -> Result<StateResult, TaskError> + Send + 'static,
{
    /// Creates a new function-backed task.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            entry: [EntryPoint::new("run", Self::call)],
        }
    }

    fn call(&mut self, ctx: &mut TaskContext) -> Result<StateResult, TaskError> {
        (self.f)(ctx)
    }
}

impl<F> Task for TaskFn<F>
where
    F: FnMut(&mut TaskContext) -> Result<StateResult, TaskError> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_points(&self) -> &[EntryPoint<Self>] {
        &self.entry
    }
}
