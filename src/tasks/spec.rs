//! # Task specification for scheduled execution.
//!
//! [`TaskSpec`] bundles a task with its defer budget.
//!
//! A spec can be created:
//! - **Explicitly** with [`TaskSpec::new`] (unlimited defers)
//! - **From config** with [`TaskSpec::with_defaults`] (inherits `Config::defer_budget`)

use crate::config::Config;
use crate::tasks::task::{Runnable, Task};

/// A task ready to be submitted.
///
/// ## Example
/// ```rust
/// use parley::{Config, TaskContext, TaskError, TaskFn, TaskSpec, StateResult};
///
/// let t = TaskFn::new("noop", |_ctx: &mut TaskContext| Ok::<_, TaskError>(StateResult::complete()));
/// let spec = TaskSpec::new(t).with_defer_budget(Some(3));
/// assert_eq!(spec.defer_budget(), Some(3));
/// assert_eq!(spec.name(), "noop");
///
/// let t = TaskFn::new("noop", |_ctx: &mut TaskContext| Ok::<_, TaskError>(StateResult::complete()));
/// let spec = TaskSpec::with_defaults(t, &Config::default());
/// assert_eq!(spec.defer_budget(), None);
/// ```
pub struct TaskSpec {
    task: Box<dyn Runnable>,
    defer_budget: Option<u32>,
}

impl TaskSpec {
    /// Wraps `task` with an unlimited defer budget.
    pub fn new<T: Task>(task: T) -> Self {
        Self {
            task: Box::new(task),
            defer_budget: None,
        }
    }

    /// Wraps `task`, inheriting the defer budget from `cfg`.
    pub fn with_defaults<T: Task>(task: T, cfg: &Config) -> Self {
        Self::new(task).with_defer_budget(cfg.default_defer_budget())
    }

    /// Maximum number of defers before the task is errored (`None` = unlimited).
    pub fn with_defer_budget(mut self, budget: Option<u32>) -> Self {
        self.defer_budget = budget;
        self
    }

    /// Task name.
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Defer budget, if any.
    pub fn defer_budget(&self) -> Option<u32> {
        self.defer_budget
    }

    pub(crate) fn into_parts(self) -> (Box<dyn Runnable>, Option<u32>) {
        (self.task, self.defer_budget)
    }
}
