//! # Per-invocation context handed to entry points.

use crate::core::SchedulerHandle;
use crate::error::RuntimeError;
use crate::tasks::spec::TaskSpec;
use crate::tasks::task::{Task, TaskId};

/// What an entry point may know about (and do with) its own scheduling.
pub struct TaskContext {
    id: TaskId,
    entry: &'static str,
    invocation: u32,
    defers: u32,
    handle: Option<SchedulerHandle>,
}

impl TaskContext {
    pub(crate) fn new(
        id: TaskId,
        entry: &'static str,
        invocation: u32,
        defers: u32,
        handle: SchedulerHandle,
    ) -> Self {
        Self {
            id,
            entry,
            invocation,
            defers,
            handle: Some(handle),
        }
    }

    /// Context not attached to any scheduler, for driving a task by hand.
    ///
    /// [`submit`](Self::submit) returns [`RuntimeError::Closed`].
    pub fn detached(id: TaskId) -> Self {
        Self {
            id,
            entry: "",
            invocation: 0,
            defers: 0,
            handle: None,
        }
    }

    /// Id of the running task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name of the entry point being invoked.
    pub fn entry(&self) -> &'static str {
        self.entry
    }

    /// 1-based number of this invocation.
    pub fn invocation(&self) -> u32 {
        self.invocation
    }

    /// Defers performed so far.
    pub fn defers(&self) -> u32 {
        self.defers
    }

    /// Submits another task to the same scheduler.
    pub fn submit<T: Task>(&self, task: T) -> Result<TaskId, RuntimeError> {
        self.submit_spec(TaskSpec::new(task))
    }

    /// Submits another task spec to the same scheduler.
    pub fn submit_spec(&self, spec: TaskSpec) -> Result<TaskId, RuntimeError> {
        match &self.handle {
            Some(h) => h.submit_spec(spec),
            None => Err(RuntimeError::Closed),
        }
    }
}
