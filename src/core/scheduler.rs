//! # Scheduler: drives resumable tasks to a terminal outcome.
//!
//! The [`Scheduler`] owns the ready queue, the deferred set (via the timer),
//! a small pool of dispatch workers and the table of live tasks.
//!
//! ## Architecture
//! ```text
//! submit(spec) ──► live table + TaskSubmitted ──► ready queue (FIFO, unbounded)
//!                                                      │
//!                                   ┌──────────────────┼──────────────────┐
//!                                   ▼                  ▼                  ▼
//!                               worker 1           worker 2    ...    worker N
//!                                   │  run_once(job) → StateResult
//!                                   ├─ Defer(None)     ──► ready queue (back)
//!                                   ├─ Defer(Some(d))  ──► timer ──(now + d)──► ready queue
//!                                   ├─ Complete        ──► retire (TaskCompleted)
//!                                   └─ Errored / Err   ──► retire (TaskErrored)
//!
//! retire(job):
//!   take_conversation() ─► unread replies? ─► ConversationLeaked + counter
//!   drop conversation (unregisters it) ─► drop task ─► counters ─► live table
//! ```
//!
//! ## Rules
//! - A job is owned by exactly one place at a time (queue, worker or timer),
//!   so invocations of a task never overlap.
//! - Defer without delay is a cooperative yield: round-robin, no priorities.
//! - A task's failure or panic never reaches other tasks or the workers.
//! - Every submitted task is retired exactly once.
//!
//! ## Example
//! ```rust
//! use parley::{Config, Scheduler, StateResult, TaskContext, TaskError, TaskFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.workers = 1;
//!     let scheduler = Scheduler::builder(cfg).build();
//!
//!     let mut polls = 0;
//!     scheduler.submit(TaskFn::new("poller", move |_ctx: &mut TaskContext| {
//!         polls += 1;
//!         if polls < 3 {
//!             Ok::<_, TaskError>(StateResult::defer(0))
//!         } else {
//!             Ok(StateResult::complete())
//!         }
//!     }))?;
//!
//!     scheduler.wait_idle().await;
//!     assert_eq!(scheduler.counters().get("scheduler.tasks.completed"), 1);
//!     scheduler.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::core::builder::SchedulerBuilder;
use crate::core::job::{Exit, Job};
use crate::core::runner::run_once;
use crate::core::shutdown;
use crate::core::timer::TimerCmd;
use crate::counters::{CounterSet, names};
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;
use crate::tasks::{Outcome, StateResult, Task, TaskId, TaskSpec};

/// Live-table entry.
pub(crate) struct LiveEntry {
    pub(crate) name: Arc<str>,
    pub(crate) token: CancellationToken,
}

/// State shared by the scheduler, its workers and the timer.
pub(crate) struct Shared {
    pub(crate) cfg: Config,
    pub(crate) bus: Bus,
    pub(crate) counters: Arc<CounterSet>,
    pub(crate) ready_tx: mpsc::UnboundedSender<Job>,
    pub(crate) timer_tx: mpsc::UnboundedSender<TimerCmd>,
    pub(crate) live: DashMap<TaskId, LiveEntry>,
    pub(crate) live_count: watch::Sender<usize>,
    pub(crate) next_id: AtomicU64,
    pub(crate) runtime_token: CancellationToken,
}

impl Shared {
    pub(crate) fn runtime_token(&self) -> &CancellationToken {
        &self.runtime_token
    }

    fn submit_spec(&self, spec: TaskSpec) -> Result<TaskId, RuntimeError> {
        if self.runtime_token.is_cancelled() {
            return Err(RuntimeError::Closed);
        }
        Ok(self.admit(spec))
    }

    /// Registers a task as live and queues its first invocation.
    ///
    /// May race with shutdown: once the ready queue is closed the job is
    /// retired as cancelled instead of queued.
    fn admit(&self, spec: TaskSpec) -> TaskId {
        let (task, budget) = spec.into_parts();
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name: Arc<str> = Arc::from(task.name());
        let token = self.runtime_token.child_token();

        self.live.insert(
            id,
            LiveEntry {
                name: Arc::clone(&name),
                token: token.clone(),
            },
        );
        self.live_count.send_modify(|n| *n += 1);
        self.counters.inc(names::TASKS_SUBMITTED);

        let mut ev = Event::new(EventKind::TaskSubmitted)
            .with_task(Arc::clone(&name))
            .with_task_id(id.get());
        if let Some(entry) = task.entry_name(0) {
            ev = ev.with_entry(entry);
        }
        self.bus.publish(ev);
        debug!(task = %name, %id, "task submitted");

        self.enqueue(Job {
            id,
            name,
            task,
            index: 0,
            invocations: 0,
            defers: 0,
            budget,
            token,
        });
        id
    }

    fn cancel(&self, id: TaskId) -> bool {
        let Some(token) = self.live.get(&id).map(|e| e.token.clone()) else {
            return false;
        };
        token.cancel();
        let _ = self.timer_tx.send(TimerCmd::Cancel(id));
        true
    }

    /// Runs one invocation of `job` and acts on its result.
    pub(crate) fn dispatch(self: &Arc<Self>, mut job: Job) {
        if job.token.is_cancelled() {
            return self.retire(job, Exit::Cancelled);
        }

        let handle = SchedulerHandle {
            shared: Arc::clone(self),
        };
        let result = run_once(&mut job, &handle);
        drop(handle);

        match result {
            Ok(StateResult {
                next,
                outcome: Outcome::Defer(delay),
            }) => {
                job.index = next;
                job.defers += 1;
                if job.over_budget() {
                    let defers = job.defers;
                    return self.retire(
                        job,
                        Exit::Errored(Some(TaskError::DeferBudgetExhausted { defers })),
                    );
                }
                if job.token.is_cancelled() {
                    return self.retire(job, Exit::Cancelled);
                }

                let mut ev = Event::new(EventKind::TaskDeferred)
                    .with_task(Arc::clone(&job.name))
                    .with_task_id(job.id.get())
                    .with_invocation(job.invocations);
                if let Some(entry) = job.task.entry_name(next) {
                    ev = ev.with_entry(entry);
                }
                if let Some(d) = delay {
                    ev = ev.with_delay(d);
                }
                self.bus.publish(ev);
                self.park(job, delay);
            }
            Ok(StateResult {
                outcome: Outcome::Complete,
                ..
            }) => self.retire(job, Exit::Completed),
            Ok(StateResult {
                outcome: Outcome::Errored,
                ..
            }) => self.retire(job, Exit::Errored(None)),
            Err(err) => self.retire(job, Exit::Errored(Some(err))),
        }
    }

    /// Hands a deferred job to the ready queue or the timer.
    fn park(&self, job: Job, delay: Option<Duration>) {
        match delay.filter(|d| !d.is_zero()) {
            None => self.enqueue(job),
            Some(d) => {
                let due = Instant::now() + d;
                if let Err(mpsc::error::SendError(TimerCmd::Defer { job, .. })) =
                    self.timer_tx.send(TimerCmd::Defer { job, due })
                {
                    self.retire(job, Exit::Cancelled);
                }
            }
        }
    }

    /// Appends a job to the ready queue; retires it if the queue is gone.
    pub(crate) fn enqueue(&self, job: Job) {
        if let Err(mpsc::error::SendError(job)) = self.ready_tx.send(job) {
            self.retire(job, Exit::Cancelled);
        }
    }

    /// Destroys a job: releases its conversation, counts, reports.
    pub(crate) fn retire(&self, mut job: Job, exit: Exit) {
        if let Some(conv) = job.task.take_conversation() {
            let unread = conv.available_reply_count();
            if unread > 0 {
                self.counters.inc(names::CONVERSATIONS_LEAKED);
                warn!(
                    task = %job.name, id = %job.id, conversation = %conv.id(), unread,
                    "releasing undrained conversation"
                );
                self.bus.publish(
                    Event::new(EventKind::ConversationLeaked)
                        .with_task(Arc::clone(&job.name))
                        .with_task_id(job.id.get())
                        .with_conversation(conv.id().get()),
                );
            }
            drop(conv);
        }

        let (kind, counter) = match &exit {
            Exit::Completed => (EventKind::TaskCompleted, names::TASKS_COMPLETED),
            Exit::Errored(_) => (EventKind::TaskErrored, names::TASKS_ERRORED),
            Exit::Cancelled => (EventKind::TaskCancelled, names::TASKS_CANCELLED),
        };
        let mut ev = Event::new(kind)
            .with_task(Arc::clone(&job.name))
            .with_task_id(job.id.get())
            .with_invocation(job.invocations);
        if let Exit::Errored(err) = &exit {
            let reason = match err {
                Some(e) => e.to_string(),
                None => "errored".to_string(),
            };
            debug!(task = %job.name, id = %job.id, %reason, "task errored");
            ev = ev.with_reason(reason);
        }

        let id = job.id;
        drop(job);
        self.counters.inc(counter);
        if self.live.remove(&id).is_some() {
            self.live_count.send_modify(|n| *n = n.saturating_sub(1));
        }
        self.bus.publish(ev);
    }
}

/// Cloneable submission handle, usable from anywhere (including entry points).
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Submits a task with an unlimited defer budget.
    pub fn submit<T: Task>(&self, task: T) -> Result<TaskId, RuntimeError> {
        self.submit_spec(TaskSpec::new(task))
    }

    /// Submits a task spec.
    pub fn submit_spec(&self, spec: TaskSpec) -> Result<TaskId, RuntimeError> {
        self.shared.submit_spec(spec)
    }

    /// Cancels one task. Returns `false` if it is not live.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.shared.cancel(id)
    }

    /// Counter set shared with the scheduler.
    pub fn counters(&self) -> &Arc<CounterSet> {
        &self.shared.counters
    }
}

/// Owns the dispatch workers, the timer and the event fan-out.
pub struct Scheduler {
    handle: SchedulerHandle,
    ready_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    subs: Arc<SubscriberSet>,
}

impl Scheduler {
    /// Starts building a scheduler.
    pub fn builder(cfg: Config) -> SchedulerBuilder {
        SchedulerBuilder::new(cfg)
    }

    pub(crate) fn from_parts(
        shared: Arc<Shared>,
        ready_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>,
        workers: Vec<JoinHandle<()>>,
        subs: Arc<SubscriberSet>,
    ) -> Self {
        Self {
            handle: SchedulerHandle { shared },
            ready_rx,
            workers: parking_lot::Mutex::new(workers),
            subs,
        }
    }

    /// Submits a task with an unlimited defer budget.
    pub fn submit<T: Task>(&self, task: T) -> Result<TaskId, RuntimeError> {
        self.handle.submit(task)
    }

    /// Submits a task spec.
    pub fn submit_spec(&self, spec: TaskSpec) -> Result<TaskId, RuntimeError> {
        self.handle.submit_spec(spec)
    }

    /// Cancels one task; it is retired (and its conversation released) without
    /// running again.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.handle.cancel(id)
    }

    /// Cancels every task and stops accepting new ones.
    pub fn cancel_all(&self) {
        self.handle.shared.runtime_token.cancel();
    }

    /// Cloneable submission handle.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Counter set shared with the scheduler.
    pub fn counters(&self) -> &Arc<CounterSet> {
        self.handle.counters()
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.handle.shared.cfg
    }

    /// Raw receiver of runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.handle.shared.bus.subscribe()
    }

    /// Number of user subscribers attached.
    pub fn subscriber_count(&self) -> usize {
        self.subs.len()
    }

    /// Sorted names of live tasks.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handle
            .shared
            .live
            .iter()
            .map(|e| e.value().name.to_string())
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        *self.handle.shared.live_count.borrow()
    }

    /// True if no task is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once no task is live.
    pub async fn wait_idle(&self) {
        let mut rx = self.handle.shared.live_count.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Cancels everything and waits up to `Config::grace` for every task to
    /// be retired.
    ///
    /// Publishes [`EventKind::AllStoppedWithin`] on success, or
    /// [`EventKind::GraceExceeded`] and returns [`RuntimeError::GraceExceeded`].
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let shared = &self.handle.shared;
        shared.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.cancel_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        let grace = shared.cfg.grace;
        let stopped = async {
            for w in workers {
                let _ = w.await;
            }
            self.drain_ready().await;
            self.wait_idle().await;
        };

        match time::timeout(grace, stopped).await {
            Ok(()) => {
                shared.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                shared.bus.publish(Event::new(EventKind::GraceExceeded));
                Err(RuntimeError::GraceExceeded {
                    grace,
                    stuck: self.list(),
                })
            }
        }
    }

    /// Waits for a termination signal, then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        if let Err(e) = shutdown::wait_for_shutdown_signal().await {
            warn!(error = %e, "signal registration failed; shutting down");
        }
        self.shutdown().await
    }

    async fn drain_ready(&self) {
        let mut rx = self.ready_rx.lock().await;
        rx.close();
        while let Ok(job) = rx.try_recv() {
            self.handle.shared.retire(job, Exit::Cancelled);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.shared.runtime_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskContext, TaskFn};

    fn noop() -> TaskSpec {
        TaskSpec::new(TaskFn::new("late", |_ctx: &mut TaskContext| {
            Ok(StateResult::complete())
        }))
    }

    #[tokio::test]
    async fn test_admit_after_shutdown_drain_is_retired() {
        let scheduler = Scheduler::builder(Config::default()).build();
        scheduler.shutdown().await.unwrap();

        // A submission that passed the open check before cancellation.
        let id = scheduler.handle.shared.admit(noop());
        assert_eq!(scheduler.len(), 0);
        assert!(scheduler.list().is_empty());
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.counters().get(names::TASKS_SUBMITTED), 1);
        assert_eq!(scheduler.counters().get(names::TASKS_CANCELLED), 1);
        scheduler.wait_idle().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_refused() {
        let scheduler = Scheduler::builder(Config::default()).build();
        scheduler.shutdown().await.unwrap();
        assert!(matches!(
            scheduler.submit_spec(noop()),
            Err(RuntimeError::Closed)
        ));
        assert_eq!(scheduler.counters().get(names::TASKS_SUBMITTED), 0);
    }
}
