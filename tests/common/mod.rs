//! Shared harness for integration tests: an in-memory store, a registry,
//! and helpers to run a job to its terminal state against a mock site.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use docpress::Fetcher;
use docpress::config::{CrawlOptions, build_job_config};
use docpress::jobs::JobRegistry;
use docpress::store::{EventRecord, JobKey, JobRecord, JobStore, MemoryStore};

pub struct TestHarness {
    pub store: Arc<dyn JobStore>,
    pub registry: Arc<JobRegistry>,
}

pub fn harness() -> TestHarness {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(
        Fetcher::new("docpress-test/0 (+https://example.com/bot)", 10 * 1024 * 1024)
            .expect("client should build"),
    );
    let registry = Arc::new(JobRegistry::new(
        Arc::clone(&store),
        fetcher,
        Duration::from_secs(300),
    ));
    TestHarness { store, registry }
}

/// Options tuned for tests: fast pacing, no minimum content length, and no
/// path-prefix scoping so fixtures can link across sibling paths.
pub fn fast_options() -> CrawlOptions {
    CrawlOptions {
        rate_limit_ms: 10,
        quality_threshold: 0,
        respect_path_prefix: false,
        ..CrawlOptions::default()
    }
}

/// Create, launch, and wait out a job; returns its key and final record.
pub async fn run_job(
    harness: &TestHarness,
    seed: &str,
    options: CrawlOptions,
    deadline: Duration,
) -> (JobKey, JobRecord) {
    let cfg = build_job_config(seed, options, deadline).expect("config should validate");
    let key = JobKey::new("test-user", uuid::Uuid::new_v4().to_string());
    harness
        .store
        .create_job(JobRecord::new(&key, cfg.seed.to_string(), cfg.options.clone()))
        .await
        .expect("create should succeed");
    harness.registry.launch(key.clone(), cfg);

    let wait_limit = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let record = harness
            .store
            .get_job(&key)
            .await
            .expect("get should succeed")
            .expect("job should exist");
        if record.status.is_terminal() {
            return (key, record);
        }
        assert!(
            tokio::time::Instant::now() < wait_limit,
            "job did not reach a terminal state in time"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// The full persisted event log for a job.
pub async fn events(harness: &TestHarness, key: &JobKey) -> Vec<EventRecord> {
    harness
        .store
        .events_after(key, 0)
        .await
        .expect("event read should succeed")
}

/// Event types in append order.
pub fn event_types(log: &[EventRecord]) -> Vec<&str> {
    log.iter().map(|e| e.event_type.as_str()).collect()
}

/// Count events of one type.
pub fn count_events(log: &[EventRecord], event_type: &str) -> usize {
    log.iter().filter(|e| e.event_type == event_type).count()
}
