//! In-memory `JobStore` implementation.
//!
//! Backs all three collections with `DashMap`s. Per-job appends take a
//! short `parking_lot` mutex on that job's log, which is what makes event
//! ids gap-free under concurrent publishers; everything else is shard-level
//! locking inside `DashMap`.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::types::{EventRecord, JobCounters, JobKey, JobRecord, JobStatus, PageResult};
use super::{JobStore, StoreError};

#[derive(Default)]
struct ResultLog {
    entries: Vec<PageResult>,
    seen_urls: HashSet<String>,
}

/// Process-local store. Suitable for a single-node deployment; the trait
/// keeps the engine oblivious to that choice.
#[derive(Default)]
pub struct MemoryStore {
    jobs: DashMap<JobKey, JobRecord>,
    results: DashMap<JobKey, Mutex<ResultLog>>,
    events: DashMap<JobKey, Mutex<Vec<EventRecord>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, record: JobRecord) -> Result<(), StoreError> {
        let key = record.key();
        if self.jobs.contains_key(&key) {
            return Err(StoreError::Backend(format!("duplicate job id {key}")));
        }
        self.jobs.insert(key, record);
        Ok(())
    }

    async fn get_job(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.jobs.get(key).map(|r| r.value().clone()))
    }

    async fn list_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn update_counters(
        &self,
        key: &JobKey,
        counters: JobCounters,
    ) -> Result<(), StoreError> {
        match self.jobs.get_mut(key) {
            Some(mut record) => {
                record.counters = counters;
                Ok(())
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    async fn cas_status(
        &self,
        key: &JobKey,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<bool, StoreError> {
        // get_mut holds the shard lock, making check-and-set atomic.
        match self.jobs.get_mut(key) {
            Some(mut record) => {
                if from.contains(&record.status) {
                    record.status = to;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    async fn finish_job(
        &self,
        key: &JobKey,
        error: Option<String>,
        final_markdown: Option<String>,
    ) -> Result<(), StoreError> {
        match self.jobs.get_mut(key) {
            Some(mut record) => {
                record.completed_at = Some(Utc::now());
                record.error = error;
                record.final_markdown = final_markdown;
                Ok(())
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    async fn append_page_result(
        &self,
        key: &JobKey,
        result: PageResult,
    ) -> Result<(), StoreError> {
        let log = self.results.entry(key.clone()).or_default();
        let mut log = log.lock();
        if log.seen_urls.insert(result.url.clone()) {
            log.entries.push(result);
        }
        Ok(())
    }

    async fn page_results(&self, key: &JobKey) -> Result<Vec<PageResult>, StoreError> {
        Ok(self
            .results
            .get(key)
            .map(|log| log.lock().entries.clone())
            .unwrap_or_default())
    }

    async fn append_event(
        &self,
        key: &JobKey,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventRecord, StoreError> {
        let log = self.events.entry(key.clone()).or_default();
        let mut log = log.lock();
        let record = EventRecord {
            event_id: log.len() as u64 + 1,
            job_id: key.job_id.clone(),
            user_id: key.user_id.clone(),
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        };
        log.push(record.clone());
        Ok(record)
    }

    async fn events_after(
        &self,
        key: &JobKey,
        after: u64,
    ) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self
            .events
            .get(key)
            .map(|log| {
                log.lock()
                    .iter()
                    .filter(|e| e.event_id > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlOptions;
    use std::sync::Arc;

    fn key() -> JobKey {
        JobKey::new("user-1", "job-1")
    }

    fn record(k: &JobKey) -> JobRecord {
        JobRecord::new(k, "https://example.com/".to_string(), CrawlOptions::default())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        store.create_job(record(&key())).await.expect("create should succeed");
        let fetched = store.get_job(&key()).await.expect("get should succeed");
        assert_eq!(fetched.expect("job should exist").status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryStore::new();
        store.create_job(record(&key())).await.expect("create should succeed");
        assert!(store.create_job(record(&key())).await.is_err());
    }

    #[tokio::test]
    async fn test_user_namespacing_in_list() {
        let store = MemoryStore::new();
        store.create_job(record(&key())).await.expect("create should succeed");
        let other = JobKey::new("user-2", "job-2");
        store.create_job(record(&other)).await.expect("create should succeed");

        let mine = store.list_jobs("user-1", 10).await.expect("list should succeed");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].job_id, "job-1");
    }

    #[tokio::test]
    async fn test_cas_status_single_winner() {
        let store = Arc::new(MemoryStore::new());
        store.create_job(record(&key())).await.expect("create should succeed");
        store
            .cas_status(&key(), &[JobStatus::Pending], JobStatus::Running)
            .await
            .expect("cas should succeed");

        let mut wins = 0;
        for _ in 0..8 {
            if store
                .cas_status(&key(), &[JobStatus::Running], JobStatus::Completed)
                .await
                .expect("cas should succeed")
            {
                wins += 1;
            }
        }
        assert_eq!(wins, 1, "exactly one finalizer may win");
    }

    #[tokio::test]
    async fn test_event_ids_monotone_gap_free() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store
                        .append_event(&key(), "progress", serde_json::json!({}))
                        .await
                        .expect("append should succeed");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        let events = store.events_after(&key(), 0).await.expect("read should succeed");
        assert_eq!(events.len(), 100);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.event_id, i as u64 + 1);
        }
    }

    #[tokio::test]
    async fn test_events_after_returns_suffix() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store
                .append_event(&key(), "progress", serde_json::json!({}))
                .await
                .expect("append should succeed");
        }
        let suffix = store.events_after(&key(), 3).await.expect("read should succeed");
        assert_eq!(
            suffix.iter().map(|e| e.event_id).collect::<Vec<_>>(),
            vec![4, 5]
        );
    }

    #[tokio::test]
    async fn test_page_result_append_idempotent() {
        let store = MemoryStore::new();
        let result = PageResult {
            url: "https://example.com/a".to_string(),
            title: Some("A".to_string()),
            markdown: Some("# A".to_string()),
            word_count: 1,
            content_hash: Some("deadbeef".to_string()),
            status: crate::store::PageStatus::Ok,
            error: None,
            depth: 0,
            parent_url: None,
            fetched_at: Utc::now(),
        };
        store
            .append_page_result(&key(), result.clone())
            .await
            .expect("append should succeed");
        store
            .append_page_result(&key(), result)
            .await
            .expect("append should succeed");
        let results = store.page_results(&key()).await.expect("read should succeed");
        assert_eq!(results.len(), 1);
    }
}
