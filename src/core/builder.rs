use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::counters::CounterSet;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

use super::scheduler::{Scheduler, Shared};
use super::{timer, worker};

/// Builder for a [`Scheduler`].
pub struct SchedulerBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    counters: Option<Arc<CounterSet>>,
}

impl SchedulerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            counters: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues; a slow subscriber never stalls dispatch.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Shares an existing counter set (e.g. the one the conversation registry uses).
    pub fn with_counters(mut self, counters: Arc<CounterSet>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Builds the scheduler and spawns its workers, timer and event listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<Scheduler> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let counters = self.counters.unwrap_or_default();
        let workers = self.cfg.worker_count();

        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (live_count, _) = watch::channel(0usize);

        let shared = Arc::new(Shared {
            cfg: self.cfg,
            bus: bus.clone(),
            counters,
            ready_tx,
            timer_tx,
            live: DashMap::new(),
            live_count,
            next_id: AtomicU64::new(1),
            runtime_token: CancellationToken::new(),
        });
        let ready_rx = Arc::new(AsyncMutex::new(ready_rx));

        let mut handles = Vec::with_capacity(workers + 1);
        handles.push(tokio::spawn(timer::run_timer(Arc::clone(&shared), timer_rx)));
        for n in 0..workers {
            handles.push(tokio::spawn(worker::run_worker(
                Arc::clone(&shared),
                Arc::clone(&ready_rx),
                n,
            )));
        }

        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        if !subs.is_empty() {
            subscriber_listener(&bus, Arc::clone(&subs));
        }

        Arc::new(Scheduler::from_parts(shared, ready_rx, handles, subs))
    }
}

/// Forwards bus events to the subscriber set (fire-and-forget).
fn subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
