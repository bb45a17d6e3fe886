//! # Dispatch worker.
//!
//! Workers share the ready queue's receiver behind an async mutex. Each one
//! pops a job, runs a single invocation through [`Shared::dispatch`] and yields
//! back to the runtime before taking the next job.
//!
//! ## Rules
//! - A worker holds at most one job at a time
//! - On runtime cancellation the worker stops, closes the ready queue and
//!   retires whatever is still queued; later sends are refused and retired by
//!   the sender

use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::trace;

use crate::core::job::{Exit, Job};
use crate::core::scheduler::Shared;

pub(crate) async fn run_worker(
    shared: Arc<Shared>,
    ready: Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>,
    n: usize,
) {
    let token = shared.runtime_token().clone();
    trace!(worker = n, "worker started");

    loop {
        let next = {
            let mut rx = ready.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = next else { break };

        shared.dispatch(job);
        tokio::task::yield_now().await;
    }

    let mut rx = ready.lock().await;
    rx.close();
    while let Ok(job) = rx.try_recv() {
        shared.retire(job, Exit::Cancelled);
    }
    trace!(worker = n, "worker stopped");
}
