//! Per-job crawl orchestration.
//!
//! One `JobRunner` owns a job's mutable state: the frontier, the counters,
//! the deadline, and the transition into exactly one terminal state. The
//! run loop keeps up to `max_concurrent_requests` page tasks in flight,
//! spacing task starts by the job's rate limit; each task walks the
//! fetch -> extract -> dedup -> store -> discover pipeline and recovers its
//! own page-level failures into page results and counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::Rng;
use url::Url;

use crate::config::JobConfig;
use crate::dedup::DedupCache;
use crate::events::{JobEvent, JobEventBus};
use crate::extractor::extract_page;
use crate::fetcher::{FetchError, Fetcher, MAX_FETCH_ATTEMPTS};
use crate::queue::{PageTask, WorkQueue};
use crate::store::{
    JobCounters, JobKey, JobStatus, JobStore, PageResult, PageStatus, StoreError,
};

/// Interval between `time_update` events while the job runs.
const TIME_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Bounded attempts for writes to the job's own record.
const STORE_WRITE_ATTEMPTS: u32 = 3;

/// Separator between pages in the final corpus.
const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Calculate exponential backoff with jitter for page retries.
///
/// Formula: 1s * 2^attempt, capped at 30s, with +/-20% jitter so parallel
/// retries against one host spread out.
fn retry_backoff(attempt: u32) -> Duration {
    const BASE_DELAY_MS: u64 = 1_000;
    const MAX_DELAY_MS: u64 = 30_000;
    const JITTER_PERCENT: f64 = 0.2;

    let exp_delay = BASE_DELAY_MS.saturating_mul(1 << attempt.min(5));
    let jitter = rand::rng().random_range(-JITTER_PERCENT..=JITTER_PERCENT);
    let jittered = (exp_delay as f64 * (1.0 + jitter)) as u64;
    Duration::from_millis(jittered.min(MAX_DELAY_MS))
}

/// Lock-free counter cell; snapshots feed the job record and progress
/// events.
#[derive(Debug, Default)]
pub struct AtomicCounters {
    discovered: AtomicU64,
    queued: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl AtomicCounters {
    pub fn add_discovered(&self, n: u64) {
        self.discovered.fetch_add(n, Ordering::AcqRel);
    }

    pub fn add_queued(&self, n: u64) {
        self.queued.fetch_add(n, Ordering::AcqRel);
    }

    pub fn incr_processed(&self) {
        self.processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn incr_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::AcqRel);
    }

    pub fn incr_failed(&self) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    #[must_use]
    pub fn snapshot(&self) -> JobCounters {
        JobCounters {
            discovered: self.discovered.load(Ordering::Acquire),
            queued: self.queued.load(Ordering::Acquire),
            processed: self.processed.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
        }
    }
}

/// Orchestrator for one job.
pub struct JobRunner {
    cfg: JobConfig,
    key: JobKey,
    store: Arc<dyn JobStore>,
    fetcher: Arc<Fetcher>,
    dedup: Arc<DedupCache>,
    queue: Arc<WorkQueue>,
    bus: Arc<JobEventBus>,
    counters: AtomicCounters,
    /// Set by the deadline watchdog before it cancels the queue, so the
    /// terminal state can tell timeout apart from user cancellation.
    timed_out: AtomicBool,
    /// First non-retryable seed failure, if any. Decides `failed` vs
    /// `completed` when zero pages came through.
    seed_failure: Mutex<Option<String>>,
    started: Instant,
}

impl JobRunner {
    #[must_use]
    pub fn new(
        cfg: JobConfig,
        key: JobKey,
        store: Arc<dyn JobStore>,
        fetcher: Arc<Fetcher>,
        dedup: Arc<DedupCache>,
        queue: Arc<WorkQueue>,
        bus: Arc<JobEventBus>,
    ) -> Self {
        Self {
            cfg,
            key,
            store,
            fetcher,
            dedup,
            queue,
            bus,
            counters: AtomicCounters::default(),
            timed_out: AtomicBool::new(false),
            seed_failure: Mutex::new(None),
            started: Instant::now(),
        }
    }

    /// Drive the job to a terminal state. Never panics the caller; all
    /// failure modes end in a terminal status and a terminal event.
    pub async fn run(self: Arc<Self>) {
        if !self.transition_to_running().await {
            return;
        }

        // Admit the seed through the same dedup gate as every other URL.
        let seed = self.cfg.seed.clone();
        let admitted = self.dedup.add_urls(vec![seed.clone()]);
        self.counters.add_discovered(admitted.len() as u64);
        if !admitted.is_empty() && self.queue.admit(PageTask::seed(seed)) {
            self.counters.add_queued(1);
        }
        self.persist_counters().await;

        let watchdog = Arc::clone(&self).spawn_deadline_watchdog();
        let ticker = Arc::clone(&self).spawn_time_update_ticker();

        Arc::clone(&self).run_loop().await;

        watchdog.abort();
        ticker.abort();

        self.finalize().await;
    }

    /// CAS `pending -> running`. A lost CAS means the job was finalized
    /// before it started (cannot happen under the single-runner model, but
    /// the guard keeps terminal states sticky regardless).
    async fn transition_to_running(&self) -> bool {
        match self
            .store
            .cas_status(&self.key, &[JobStatus::Pending], JobStatus::Running)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!("{}: not pending at start, skipping run", self.key);
                false
            }
            Err(e) => {
                error!("{}: failed to mark running: {e}", self.key);
                false
            }
        }
    }

    fn spawn_deadline_watchdog(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.cfg.job_deadline).await;
            info!("{}: wall-clock deadline reached, cancelling work", self.key);
            self.timed_out.store(true, Ordering::Release);
            self.queue.cancel();
        })
    }

    fn spawn_time_update_ticker(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TIME_UPDATE_INTERVAL);
            interval.tick().await; // first tick is immediate, skip it
            loop {
                interval.tick().await;
                let elapsed = self.started.elapsed();
                let remaining = self.cfg.job_deadline.saturating_sub(elapsed);
                let event = JobEvent::TimeUpdate {
                    elapsed_ms: elapsed.as_millis() as u64,
                    remaining_ms: remaining.as_millis() as u64,
                };
                if let Err(e) = self.bus.publish(event).await {
                    warn!("{}: failed to publish time_update: {e}", self.key);
                }
            }
        })
    }

    /// Main fill-and-await loop: keep tasks in flight up to the concurrency
    /// cap, one start per rate-limit slot, until the frontier drains or the
    /// job is cancelled.
    async fn run_loop(self: Arc<Self>) {
        let concurrency = self.cfg.options.max_concurrent_requests;
        let mut active = FuturesUnordered::new();

        loop {
            while active.len() < concurrency && !self.queue.is_cancelled() {
                let Some(task) = self.queue.pop() else { break };
                let Some(slot) = Arc::clone(&self.queue).acquire_slot().await else {
                    break;
                };

                let event = JobEvent::UrlStarted {
                    url: task.url.to_string(),
                    depth: task.depth as u32,
                };
                if let Err(e) = self.bus.publish(event).await {
                    warn!("{}: failed to publish url_started: {e}", self.key);
                }

                let runner = Arc::clone(&self);
                active.push(tokio::spawn(async move {
                    let _slot = slot;
                    runner.process_task(task).await;
                }));
            }

            if active.is_empty() {
                if self.queue.size() == 0 || self.queue.is_cancelled() {
                    break;
                }
                continue;
            }

            match active.next().await {
                Some(Ok(())) | None => {}
                Some(Err(e)) => error!("{}: page task panicked: {e}", self.key),
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-URL task pipeline
    // ------------------------------------------------------------------

    async fn process_task(&self, task: PageTask) {
        if self.queue.is_cancelled() {
            return;
        }

        debug!("{}: crawling [depth {}] {}", self.key, task.depth, task.url);

        let fetched = tokio::select! {
            () = self.queue.cancellation_token().cancelled_owned() => return,
            result = self
                .fetcher
                .fetch(&task.url, self.cfg.options.request_timeout()) => result,
        };

        let page = match fetched {
            Ok(page) => page,
            Err(e) if e.is_retryable() && task.attempt + 1 < MAX_FETCH_ATTEMPTS => {
                let delay = retry_backoff(task.attempt);
                warn!(
                    "{}: attempt {}/{MAX_FETCH_ATTEMPTS} failed for {} [{}], retrying in {delay:?}",
                    self.key,
                    task.attempt + 1,
                    task.url,
                    e.kind()
                );
                tokio::select! {
                    () = self.queue.cancellation_token().cancelled_owned() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                self.queue.requeue(task.bump_attempt());
                return;
            }
            Err(e) => {
                self.record_failure(&task, &e).await;
                return;
            }
        };

        // Extraction is synchronous; the DOM never crosses an await point.
        let child_depth = task.depth + 1;
        let (extracted, links) =
            match extract_page(&page.body, &page.final_url, child_depth, &self.cfg) {
                Ok(result) => result,
                Err(e) => {
                    self.record_parse_failure(&task, &e.to_string()).await;
                    return;
                }
            };

        // Near-duplicate suppression: the atomic insert decides a winner
        // when two workers extract identical prose concurrently.
        let is_duplicate =
            extracted.skip_reason.is_none() && !self.dedup.add_hash(extracted.content_hash);

        if is_duplicate {
            self.record_outcome(
                &task,
                PageResult {
                    url: task.url.to_string(),
                    title: Some(extracted.title.clone()),
                    markdown: None,
                    word_count: 0,
                    content_hash: Some(format!("{:016x}", extracted.content_hash)),
                    status: PageStatus::Duplicate,
                    error: None,
                    depth: task.depth as u32,
                    parent_url: task.parent.clone(),
                    fetched_at: Utc::now(),
                },
                None,
            )
            .await;
        } else if let Some(reason) = &extracted.skip_reason {
            self.record_outcome(
                &task,
                PageResult {
                    url: task.url.to_string(),
                    title: Some(extracted.title.clone()),
                    markdown: None,
                    word_count: 0,
                    content_hash: None,
                    status: PageStatus::Skipped,
                    error: Some(reason.clone()),
                    depth: task.depth as u32,
                    parent_url: task.parent.clone(),
                    fetched_at: Utc::now(),
                },
                None,
            )
            .await;
        } else {
            let result = PageResult {
                url: task.url.to_string(),
                title: Some(extracted.title.clone()),
                markdown: Some(extracted.markdown.clone()),
                word_count: extracted.word_count as u64,
                content_hash: Some(format!("{:016x}", extracted.content_hash)),
                status: PageStatus::Ok,
                error: None,
                depth: task.depth as u32,
                parent_url: task.parent.clone(),
                fetched_at: Utc::now(),
            };
            let crawled = JobEvent::UrlCrawled {
                url: task.url.to_string(),
                title: extracted.title.clone(),
                word_count: extracted.word_count as u64,
                depth: task.depth as u32,
            };
            self.record_outcome(&task, result, Some(crawled)).await;
        }

        // Discovery continues for skipped pages too: a thin hub page still
        // links to real content.
        if task.depth < self.cfg.options.max_depth {
            self.discover_links(&task.url, child_depth, links).await;
        }

        self.publish_progress().await;
        self.persist_counters().await;
    }

    /// Admit newly discovered URLs, bounded by the page budget.
    async fn discover_links(&self, parent: &Url, child_depth: usize, links: Vec<Url>) {
        if links.is_empty() {
            return;
        }

        let new_urls = self.dedup.add_urls(links);
        if new_urls.is_empty() {
            return;
        }
        self.counters.add_discovered(new_urls.len() as u64);

        let mut admitted = Vec::new();
        for url in new_urls {
            // Admission refused once the hard page bound is reached.
            if self
                .queue
                .admit(PageTask::child(url.clone(), child_depth, parent))
            {
                admitted.push(url.to_string());
            }
        }

        if admitted.is_empty() {
            return;
        }
        self.counters.add_queued(admitted.len() as u64);

        let event = JobEvent::UrlsDiscovered {
            parent_url: parent.to_string(),
            count: admitted.len(),
            urls: admitted,
        };
        if let Err(e) = self.bus.publish(event).await {
            warn!("{}: failed to publish urls_discovered: {e}", self.key);
        }
    }

    /// Store a page outcome, then publish its event. Result storage comes
    /// first so a subscriber that sees `url_crawled` can trust the result
    /// is durable.
    async fn record_outcome(
        &self,
        task: &PageTask,
        result: PageResult,
        event: Option<JobEvent>,
    ) {
        let status = result.status;
        if let Err(e) = self.store.append_page_result(&self.key, result).await {
            warn!("{}: failed to store result for {}: {e}", self.key, task.url);
        }

        match status {
            PageStatus::Ok => self.counters.incr_processed(),
            PageStatus::Skipped | PageStatus::Duplicate => {
                self.counters.incr_processed();
                self.counters.incr_skipped();
            }
            PageStatus::Failed => self.counters.incr_failed(),
        }

        if let Some(event) = event
            && let Err(e) = self.bus.publish(event).await
        {
            warn!("{}: failed to publish page event: {e}", self.key);
        }
    }

    async fn record_failure(&self, task: &PageTask, error: &FetchError) {
        let attempts = task.attempt + 1;
        warn!(
            "{}: giving up on {} after {attempts} attempt(s): {error}",
            self.key, task.url
        );

        if task.url == self.cfg.seed {
            let mut seed_failure = self.seed_failure.lock();
            if seed_failure.is_none() {
                *seed_failure = Some(error.to_string());
            }
        }

        self.record_outcome(
            task,
            PageResult {
                url: task.url.to_string(),
                title: None,
                markdown: None,
                word_count: 0,
                content_hash: None,
                status: PageStatus::Failed,
                error: Some(error.to_string()),
                depth: task.depth as u32,
                parent_url: task.parent.clone(),
                fetched_at: Utc::now(),
            },
            Some(JobEvent::UrlFailed {
                url: task.url.to_string(),
                error: error.to_string(),
                error_kind: error.kind().to_string(),
                attempts,
            }),
        )
        .await;

        self.publish_progress().await;
        self.persist_counters().await;
    }

    async fn record_parse_failure(&self, task: &PageTask, error: &str) {
        if task.url == self.cfg.seed {
            let mut seed_failure = self.seed_failure.lock();
            if seed_failure.is_none() {
                *seed_failure = Some(error.to_string());
            }
        }

        self.record_outcome(
            task,
            PageResult {
                url: task.url.to_string(),
                title: None,
                markdown: None,
                word_count: 0,
                content_hash: None,
                status: PageStatus::Failed,
                error: Some(error.to_string()),
                depth: task.depth as u32,
                parent_url: task.parent.clone(),
                fetched_at: Utc::now(),
            },
            Some(JobEvent::UrlFailed {
                url: task.url.to_string(),
                error: error.to_string(),
                error_kind: "parse".to_string(),
                attempts: task.attempt + 1,
            }),
        )
        .await;

        self.publish_progress().await;
        self.persist_counters().await;
    }

    async fn publish_progress(&self) {
        let event = JobEvent::Progress {
            counters: self.counters.snapshot(),
        };
        if let Err(e) = self.bus.publish(event).await {
            warn!("{}: failed to publish progress: {e}", self.key);
        }
    }

    async fn persist_counters(&self) {
        let counters = self.counters.snapshot();
        if let Err(e) = self
            .with_store_retry(|| self.store.update_counters(&self.key, counters))
            .await
        {
            warn!("{}: failed to persist counters: {e}", self.key);
        }
    }

    /// Bounded retry for writes to the job's own record.
    async fn with_store_retry<'a, F, Fut>(&'a self, mut op: F) -> Result<(), StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), StoreError>> + 'a,
    {
        let mut last_err = None;
        for attempt in 0..STORE_WRITE_ATTEMPTS {
            match op().await {
                Ok(()) => return Ok(()),
                Err(e @ StoreError::NotFound(_)) => return Err(e),
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(100 << attempt)).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Backend("store retry exhausted".into())))
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Decide and commit the terminal state. The status CAS is the
    /// single-writer guard: whoever wins it builds the artifact and emits
    /// the one terminal event.
    async fn finalize(&self) {
        let counters = self.counters.snapshot();
        self.persist_counters().await;

        let results = match self.store.page_results(&self.key).await {
            Ok(results) => results,
            Err(e) => {
                error!("{}: failed to read results at finalization: {e}", self.key);
                Vec::new()
            }
        };
        let ok_count = results
            .iter()
            .filter(|r| r.status == PageStatus::Ok)
            .count();

        let terminal = if self.timed_out.load(Ordering::Acquire) {
            JobStatus::Timeout
        } else if self.queue.is_cancelled() {
            JobStatus::Cancelled
        } else if ok_count > 0 {
            // Partial success still completes; failures ride along in the
            // counters.
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        let won = match self
            .store
            .cas_status(&self.key, &[JobStatus::Running], terminal)
            .await
        {
            Ok(won) => won,
            Err(e) => {
                error!("{}: terminal status CAS failed: {e}", self.key);
                false
            }
        };
        if !won {
            debug!("{}: already finalized elsewhere", self.key);
            return;
        }

        let duration_ms = self.started.elapsed().as_millis() as u64;
        let (error, final_markdown, event) = match terminal {
            JobStatus::Completed => {
                let corpus = build_corpus(&results);
                let total_words = corpus.total_words;
                (
                    None,
                    Some(corpus.markdown),
                    JobEvent::JobCompleted {
                        counters,
                        total_words,
                        duration_ms,
                    },
                )
            }
            JobStatus::Failed => {
                let message = self
                    .seed_failure
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "no pages could be crawled".to_string());
                (
                    Some(message.clone()),
                    None,
                    JobEvent::JobFailed {
                        error: message,
                        counters,
                    },
                )
            }
            JobStatus::Timeout => (
                Some(format!(
                    "job deadline of {:?} exceeded",
                    self.cfg.job_deadline
                )),
                None,
                JobEvent::JobTimeout { counters },
            ),
            _ => (None, None, JobEvent::JobCancelled { counters }),
        };

        if let Err(e) = self
            .with_store_retry(|| {
                self.store
                    .finish_job(&self.key, error.clone(), final_markdown.clone())
            })
            .await
        {
            error!("{}: failed to persist terminal record: {e}", self.key);
        }

        if let Err(e) = self.bus.publish(event).await {
            error!("{}: failed to publish terminal event: {e}", self.key);
        }

        info!(
            "{}: finished {:?} in {duration_ms} ms ({} ok, {} skipped, {} failed)",
            self.key, terminal, counters.processed, counters.skipped, counters.failed
        );
    }
}

struct Corpus {
    markdown: String,
    total_words: u64,
}

/// Concatenate ok results into the final corpus: stable lexicographic URL
/// order, a small per-page header, one separator between pages.
fn build_corpus(results: &[PageResult]) -> Corpus {
    let mut pages: Vec<&PageResult> = results
        .iter()
        .filter(|r| r.status == PageStatus::Ok && r.markdown.is_some())
        .collect();
    pages.sort_by(|a, b| a.url.cmp(&b.url));

    let total_words: u64 = pages.iter().map(|p| p.word_count).sum();

    // The corpus is meant for pasting into a prompt, so each page leads
    // with its own content; the title/URL provenance rides in a compact
    // comment header instead of displacing the prose.
    let mut sections = Vec::with_capacity(pages.len());
    for page in pages {
        let title = page.title.as_deref().unwrap_or("Untitled Page");
        let body = page.markdown.as_deref().unwrap_or_default();
        sections.push(format!("<!-- {title} | {} -->\n{body}", page.url));
    }

    Corpus {
        markdown: sections.join(PAGE_SEPARATOR),
        total_words,
    }
}
