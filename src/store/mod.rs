//! Durable job state
//!
//! Three logical collections keyed by `(user_id, job_id)`: the mutable job
//! record, the append-only page results, and the append-only event log with
//! a per-job monotone event id. The [`JobStore`] trait is the seam between
//! the engine and whatever backs those collections; the in-memory
//! implementation ships here, and the contract (idempotent upserts, CAS on
//! status, gap-free event ids, at-least-once tolerant appends) is what any
//! other backend must honor.

mod memory;
mod types;

pub use memory::MemoryStore;
pub use types::{
    EventRecord, JobCounters, JobKey, JobRecord, JobStatus, PageResult, PageStatus,
};

use async_trait::async_trait;

/// Store-level failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobKey),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// The three collections, behind one trait.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    // ------------------------------------------------------------------
    // Job records
    // ------------------------------------------------------------------

    /// Insert a new job record. Overwrites nothing; a duplicate id is a
    /// backend error (ids are UUIDs, collisions mean a caller bug).
    async fn create_job(&self, record: JobRecord) -> Result<(), StoreError>;

    async fn get_job(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError>;

    /// Most recent jobs for a user, newest first.
    async fn list_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<JobRecord>, StoreError>;

    /// Idempotent counter snapshot upsert.
    async fn update_counters(&self, key: &JobKey, counters: JobCounters)
    -> Result<(), StoreError>;

    /// Set `status = to` only if the current status is in `from`.
    ///
    /// Returns whether the transition happened. This is the single-writer
    /// guard for finalization: exactly one caller wins the CAS into a
    /// terminal state.
    async fn cas_status(
        &self,
        key: &JobKey,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, StoreError>;

    /// Record the terminal artifacts: completion time, optional error
    /// message, optional final Markdown. Status must already be terminal.
    async fn finish_job(
        &self,
        key: &JobKey,
        error: Option<String>,
        final_markdown: Option<String>,
    ) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Page results (append-only)
    // ------------------------------------------------------------------

    /// Append a page result. Tolerant of at-least-once delivery: a second
    /// append for the same URL is a no-op.
    async fn append_page_result(
        &self,
        key: &JobKey,
        result: PageResult,
    ) -> Result<(), StoreError>;

    async fn page_results(&self, key: &JobKey) -> Result<Vec<PageResult>, StoreError>;

    // ------------------------------------------------------------------
    // Event log (append-only, monotone ids)
    // ------------------------------------------------------------------

    /// Append an event, assigning the next event id for the job. Ids are
    /// strictly monotone starting at 1 with no gaps.
    async fn append_event(
        &self,
        key: &JobKey,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventRecord, StoreError>;

    /// All events with `event_id > after`, in id order.
    async fn events_after(&self, key: &JobKey, after: u64)
    -> Result<Vec<EventRecord>, StoreError>;
}
