//! Per-job event publishing.
//!
//! The durable log is the source of truth; the broadcast channel is a
//! latency optimization for attached subscribers. [`JobEventBus::publish`]
//! appends to the store first and only then fans out, so any event a live
//! subscriber sees is already durable, and a reconnecting subscriber can
//! always rebuild the exact sequence from the log.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use tokio::sync::broadcast;

use super::types::JobEvent;
use crate::store::{EventRecord, JobKey, JobStore, StoreError};

/// Buffered live events per subscriber before it is considered lagged.
const LIVE_CHANNEL_CAPACITY: usize = 1024;

/// Publish-side counters, mirrored into logs at job completion.
#[derive(Debug, Default)]
pub struct BusMetrics {
    pub events_published: AtomicU64,
    /// Publishes that reached the log but had no live subscriber.
    pub events_unwatched: AtomicU64,
}

/// Publisher for one job's event stream.
pub struct JobEventBus {
    store: Arc<dyn JobStore>,
    key: JobKey,
    sender: broadcast::Sender<EventRecord>,
    metrics: BusMetrics,
}

impl JobEventBus {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, key: JobKey) -> Self {
        let (sender, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            store,
            key,
            sender,
            metrics: BusMetrics::default(),
        }
    }

    /// Append an event to the durable log, then fan it out live.
    ///
    /// The store assigns the monotone event id. A missing live audience is
    /// not an error; the log still has the event for later replay.
    ///
    /// # Returns
    /// * `Ok(EventRecord)` - The persisted record, id assigned
    /// * `Err(StoreError)` - The durable append failed; nothing was fanned out
    pub async fn publish(&self, event: JobEvent) -> Result<EventRecord, StoreError> {
        let record = self
            .store
            .append_event(&self.key, event.event_type(), event.payload())
            .await?;

        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(record.clone()).is_err() {
            self.metrics.events_unwatched.fetch_add(1, Ordering::Relaxed);
            debug!("{}: published {} with no live subscribers", self.key, record.event_type);
        }

        Ok(record)
    }

    /// Subscribe to live fan-out. Callers resuming from an id should use
    /// [`super::follow_events`], which stitches replay and live together.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn key(&self) -> &JobKey {
        &self.key
    }
}
