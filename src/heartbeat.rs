//! # Heartbeat task.
//!
//! Keeps a remote endpoint alive without owning it. Each invocation upgrades a
//! [`Weak`] reference: if the endpoint still exists it is pinged and the task
//! defers for one period; once the endpoint has been torn down the task
//! completes and is never invoked again.
//!
//! ```text
//! beat ──► endpoint alive? ── yes ──► heartbeat() ──► Defer(beat, period)
//!                         └── no  ──► Complete
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::TaskError;
use crate::tasks::{EntryPoint, StateResult, Task, TaskContext};

/// Remote endpoint capability used by periodic tasks.
pub trait AgentEndpoint: Send + Sync + 'static {
    /// Identifier for logs.
    fn id(&self) -> &str;

    /// Performs the liveness action (e.g. sends a ping frame). Must not block.
    fn heartbeat(&self);
}

static HEARTBEAT_ENTRIES: [EntryPoint<HeartbeatTask>; 1] =
    [EntryPoint::new("beat", HeartbeatTask::beat)];

/// Pings an endpoint every `period` for as long as it exists.
pub struct HeartbeatTask {
    endpoint: Weak<dyn AgentEndpoint>,
    period: Duration,
    beats: u64,
}

impl HeartbeatTask {
    /// Creates a heartbeat holding a non-owning reference to `endpoint`.
    pub fn new(endpoint: &Arc<dyn AgentEndpoint>, period: Duration) -> Self {
        Self {
            endpoint: Arc::downgrade(endpoint),
            period,
            beats: 0,
        }
    }

    /// Creates a heartbeat using `cfg.heartbeat_period`.
    pub fn from_config(endpoint: &Arc<dyn AgentEndpoint>, cfg: &Config) -> Self {
        Self::new(endpoint, cfg.heartbeat_period)
    }

    /// Number of heartbeats performed so far.
    pub fn beats(&self) -> u64 {
        self.beats
    }

    fn beat(&mut self, _ctx: &mut TaskContext) -> Result<StateResult, TaskError> {
        let Some(endpoint) = self.endpoint.upgrade() else {
            debug!(beats = self.beats, "endpoint gone, heartbeat stopped");
            return Ok(StateResult::complete());
        };
        endpoint.heartbeat();
        self.beats += 1;
        trace!(endpoint = endpoint.id(), beats = self.beats, "heartbeat");
        Ok(StateResult::defer_for(0, self.period))
    }
}

impl Task for HeartbeatTask {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn entry_points(&self) -> &[EntryPoint<Self>] {
        &HEARTBEAT_ENTRIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::tasks::TaskId;

    #[derive(Default)]
    struct Probe {
        pings: AtomicU32,
    }

    impl AgentEndpoint for Probe {
        fn id(&self) -> &str {
            "probe"
        }
        fn heartbeat(&self) {
            self.pings.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_beats_while_endpoint_lives() {
        let probe = Arc::new(Probe::default());
        let endpoint: Arc<dyn AgentEndpoint> = probe.clone();
        let mut task = HeartbeatTask::new(&endpoint, Duration::from_millis(250));
        let mut ctx = TaskContext::detached(TaskId(1));

        for _ in 0..3 {
            let r = task.beat(&mut ctx).unwrap();
            assert_eq!(r, StateResult::defer_for(0, Duration::from_millis(250)));
        }
        assert_eq!(probe.pings.load(Ordering::Relaxed), 3);
        assert_eq!(task.beats(), 3);
    }

    #[test]
    fn test_completes_once_endpoint_is_gone() {
        let endpoint: Arc<dyn AgentEndpoint> = Arc::new(Probe::default());
        let mut task = HeartbeatTask::from_config(&endpoint, &Config::default());
        let mut ctx = TaskContext::detached(TaskId(1));

        assert!(!task.beat(&mut ctx).unwrap().is_terminal());
        drop(endpoint);
        assert_eq!(task.beat(&mut ctx).unwrap(), StateResult::complete());
        assert_eq!(task.beats(), 1);
    }
}
