//! # Run a single entry-point invocation.
//!
//! - Resolve the entry point at the job's current index
//! - Invoke it with a fresh [`TaskContext`], containing panics
//! - Validate the returned [`StateResult`]
//!
//! ## Rules
//! - Produces **exactly one** result per invocation
//! - A panic becomes [`TaskError::Panicked`]; it never unwinds into the worker
//! - A Defer naming a missing entry point becomes [`TaskError::InvalidEntry`]

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::job::Job;
use crate::core::scheduler::SchedulerHandle;
use crate::error::TaskError;
use crate::tasks::{Outcome, StateResult, TaskContext};

/// Invokes the job's current entry point once.
pub(crate) fn run_once(job: &mut Job, handle: &SchedulerHandle) -> Result<StateResult, TaskError> {
    let available = job.task.entry_count();
    let entry = job
        .task
        .entry_name(job.index)
        .ok_or(TaskError::InvalidEntry {
            index: job.index,
            available,
        })?;

    job.invocations += 1;
    let mut ctx = TaskContext::new(job.id, entry, job.invocations, job.defers, handle.clone());
    let index = job.index;
    let task = &mut job.task;

    let result = match catch_unwind(AssertUnwindSafe(|| task.invoke(index, &mut ctx))) {
        Ok(res) => res?,
        Err(panic) => {
            return Err(TaskError::Panicked {
                info: panic_message(panic.as_ref()),
            });
        }
    };

    if matches!(result.outcome, Outcome::Defer(_)) && result.next >= available {
        return Err(TaskError::InvalidEntry {
            index: result.next,
            available,
        });
    }
    Ok(result)
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let p: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(p.as_ref()), "static");
        let p: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(p.as_ref()), "owned");
        let p: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(p.as_ref()), "unknown panic");
    }
}
