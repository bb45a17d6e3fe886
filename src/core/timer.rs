//! # Deferred set and the timer that drains it.
//!
//! The timer is the only source of scheduled wake-ups. It owns every job that
//! returned `Defer(Some(delay))` until its due time, then moves it back to the
//! ready queue.
//!
//! ```text
//! worker ── TimerCmd::Defer{job, due} ──►┐
//! cancel ── TimerCmd::Cancel(id) ───────►├─► DeferredQueue (BTreeMap by (due, seq))
//!                                        │          │
//!                           sleep_until(next due) ──┘──► ready queue (FIFO)
//! ```
//!
//! ## Rules
//! - Jobs due at the same instant are released in submission order.
//! - A cancelled job is removed from the queue before it can fire.
//! - On shutdown every parked job is retired as cancelled.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::core::job::{Exit, Job};
use crate::core::scheduler::Shared;
use crate::tasks::TaskId;

pub(crate) enum TimerCmd {
    Defer { job: Job, due: Instant },
    Cancel(TaskId),
}

/// Time-ordered set of parked jobs.
#[derive(Default)]
pub(crate) struct DeferredQueue {
    entries: BTreeMap<(Instant, u64), Job>,
    keys: HashMap<TaskId, (Instant, u64)>,
}

impl DeferredQueue {
    pub(crate) fn insert(&mut self, job: Job, due: Instant) {
        let key = (due, job.seq());
        self.keys.insert(job.id, key);
        self.entries.insert(key, job);
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Job> {
        let key = self.keys.remove(&id)?;
        self.entries.remove(&key)
    }

    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    /// Removes and returns every job due at or before `now`, earliest first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<Job> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let job = entry.remove();
            self.keys.remove(&job.id);
            due.push(job);
        }
        due
    }

    pub(crate) fn drain(&mut self) -> Vec<Job> {
        self.keys.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Timer loop. Exits on runtime cancellation, retiring everything still parked.
pub(crate) async fn run_timer(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<TimerCmd>) {
    let token = shared.runtime_token().clone();
    let mut queue = DeferredQueue::default();

    loop {
        let next = queue.next_due();
        let wake = async move {
            match next {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(TimerCmd::Defer { job, due }) => {
                    if job.token.is_cancelled() {
                        shared.retire(job, Exit::Cancelled);
                    } else {
                        queue.insert(job, due);
                    }
                }
                Some(TimerCmd::Cancel(id)) => {
                    if let Some(job) = queue.remove(id) {
                        shared.retire(job, Exit::Cancelled);
                    }
                }
                None => break,
            },
            _ = wake => {
                for job in queue.pop_due(Instant::now()) {
                    shared.enqueue(job);
                }
            }
        }
    }

    for job in queue.drain() {
        shared.retire(job, Exit::Cancelled);
    }
    rx.close();
    while let Ok(cmd) = rx.try_recv() {
        if let TimerCmd::Defer { job, .. } = cmd {
            shared.retire(job, Exit::Cancelled);
        }
    }
}
