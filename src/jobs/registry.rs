//! Live-job registry.
//!
//! Tracks the in-process side of every job: its event bus, dedup cache, and
//! work queue. The durable side lives in the store; the registry is what a
//! subscriber needs to attach live and what a cancel needs to reach the
//! running workers. Terminal jobs linger for a grace period so reconnecting
//! subscribers still find the live channel, then a background sweep evicts
//! them and clears their dedup sets.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::runner::JobRunner;
use crate::config::JobConfig;
use crate::dedup::DedupCache;
use crate::events::JobEventBus;
use crate::fetcher::Fetcher;
use crate::queue::WorkQueue;
use crate::store::{JobKey, JobStore};

/// Sweep cadence for evicting terminal jobs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// In-process handle to a launched job.
pub struct JobHandle {
    pub bus: Arc<JobEventBus>,
    pub dedup: Arc<DedupCache>,
    queue: Arc<WorkQueue>,
}

impl JobHandle {
    /// Signal cancellation: drains the queue, in-flight tasks observe the
    /// token at their next suspension point.
    pub fn cancel(&self) {
        self.queue.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.queue.is_cancelled()
    }
}

/// Registry of live jobs for one process.
pub struct JobRegistry {
    live: DashMap<JobKey, Arc<JobHandle>>,
    store: Arc<dyn JobStore>,
    fetcher: Arc<Fetcher>,
    /// How long a terminal job's live side is retained for reconnects.
    grace: Duration,
}

impl JobRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, fetcher: Arc<Fetcher>, grace: Duration) -> Self {
        Self {
            live: DashMap::new(),
            store,
            fetcher,
            grace,
        }
    }

    /// Wire up and launch a job. The job record must already exist in the
    /// store with `pending` status; the spawned runner drives it from
    /// there.
    pub fn launch(&self, key: JobKey, cfg: JobConfig) -> Arc<JobHandle> {
        let cancel = CancellationToken::new();
        let queue = Arc::new(WorkQueue::new(
            cfg.options.max_pages,
            cfg.options.max_concurrent_requests,
            cfg.options.rate_limit_interval(),
            cancel,
        ));
        let bus = Arc::new(JobEventBus::new(Arc::clone(&self.store), key.clone()));
        let dedup = Arc::new(DedupCache::new());

        let handle = Arc::new(JobHandle {
            bus: Arc::clone(&bus),
            dedup: Arc::clone(&dedup),
            queue: Arc::clone(&queue),
        });
        self.live.insert(key.clone(), Arc::clone(&handle));

        let runner = Arc::new(JobRunner::new(
            cfg,
            key,
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            dedup,
            queue,
            bus,
        ));
        tokio::spawn(runner.run());

        handle
    }

    #[must_use]
    pub fn get(&self, key: &JobKey) -> Option<Arc<JobHandle>> {
        self.live.get(key).map(|h| Arc::clone(h.value()))
    }

    /// Cancel a live job. Returns whether a live handle was found;
    /// cancelling an already-terminal or unknown job is a no-op.
    pub fn cancel(&self, key: &JobKey) -> bool {
        match self.get(key) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything, for process shutdown.
    pub fn cancel_all(&self) {
        for entry in self.live.iter() {
            entry.value().cancel();
        }
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Evict terminal jobs older than the grace period and clear their
    /// dedup sets.
    async fn cleanup(&self) {
        let now = chrono::Utc::now();
        let keys: Vec<JobKey> = self.live.iter().map(|e| e.key().clone()).collect();
        let mut evicted = 0usize;

        for key in keys {
            let record = match self.store.get_job(&key).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    // No durable record backing this handle; drop it.
                    self.live.remove(&key);
                    continue;
                }
                Err(e) => {
                    warn!("{key}: cleanup read failed: {e}");
                    continue;
                }
            };

            if !record.status.is_terminal() {
                continue;
            }
            let Some(completed_at) = record.completed_at else {
                continue;
            };
            let age = now
                .signed_duration_since(completed_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age < self.grace {
                continue;
            }

            if let Some((_, handle)) = self.live.remove(&key) {
                handle.dedup.clear();
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!("evicted {evicted} terminal job(s) from the registry");
        }
    }

    /// Start the background sweep. Call once after wrapping the registry in
    /// an `Arc`.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                self.cleanup().await;
            }
        });
    }
}
