//! # Scheduler-side bookkeeping for one task instance.
//!
//! A [`Job`] is moved between the ready queue, a worker and the deferred set.
//! Whoever holds it is the only one able to run the task, which is what keeps
//! invocations of one task strictly sequential.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::{Runnable, TaskId};

pub(crate) struct Job {
    pub(crate) id: TaskId,
    pub(crate) name: Arc<str>,
    pub(crate) task: Box<dyn Runnable>,
    /// Entry point to run next.
    pub(crate) index: usize,
    pub(crate) invocations: u32,
    pub(crate) defers: u32,
    pub(crate) budget: Option<u32>,
    pub(crate) token: CancellationToken,
}

impl Job {
    /// Submission order; tie-break for equal due times.
    pub(crate) fn seq(&self) -> u64 {
        self.id.get()
    }

    /// True once the defer budget has been overrun.
    pub(crate) fn over_budget(&self) -> bool {
        self.budget.is_some_and(|b| self.defers > b)
    }
}

/// Why a job is being retired.
#[derive(Debug)]
pub(crate) enum Exit {
    Completed,
    Errored(Option<TaskError>),
    Cancelled,
}
