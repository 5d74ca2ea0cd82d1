//! Per-job work queue
//!
//! A FIFO frontier feeding a bounded worker pool. The queue owns the three
//! admission controls a polite crawler needs: the concurrency cap, the
//! minimum interval between task starts, and the hard admission budget
//! (`max_pages`). It also owns idle detection and the job's cancellation
//! signal; workers observe cancellation at every suspension point.

mod pacer;

pub use pacer::{PaceDecision, Pacer};

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

/// One unit of crawl work. Lives only in the queue.
#[derive(Debug, Clone)]
pub struct PageTask {
    pub url: Url,
    pub depth: usize,
    pub parent: Option<String>,
    /// Zero on first admission; bumped on each retry re-enqueue.
    pub attempt: u32,
}

impl PageTask {
    #[must_use]
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            parent: None,
            attempt: 0,
        }
    }

    #[must_use]
    pub fn child(url: Url, depth: usize, parent: &Url) -> Self {
        Self {
            url,
            depth,
            parent: Some(parent.to_string()),
            attempt: 0,
        }
    }

    /// The same task, one attempt later.
    #[must_use]
    pub fn bump_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Bounded, rate-limited FIFO work queue for one job.
#[derive(Debug)]
pub struct WorkQueue {
    queue: Mutex<VecDeque<PageTask>>,
    /// Remaining admissions before the hard page bound is reached.
    budget: AtomicUsize,
    in_flight: AtomicUsize,
    pacer: Pacer,
    semaphore: Arc<Semaphore>,
    idle: Notify,
    cancel: CancellationToken,
}

/// Guard for one running task. Holds the concurrency permit; dropping it
/// releases the slot and re-checks idleness.
#[derive(Debug)]
pub struct TaskSlot {
    _permit: OwnedSemaphorePermit,
    queue: Arc<WorkQueue>,
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.queue.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.queue.notify_if_idle();
    }
}

impl WorkQueue {
    /// Create a queue for one job.
    ///
    /// # Arguments
    /// * `admission_budget` - Hard bound on tasks ever admitted (`max_pages`)
    /// * `concurrency` - Maximum in-flight tasks
    /// * `rate_interval` - Minimum delay between task starts
    /// * `cancel` - Job-level cancellation token
    #[must_use]
    pub fn new(
        admission_budget: usize,
        concurrency: usize,
        rate_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            budget: AtomicUsize::new(admission_budget),
            in_flight: AtomicUsize::new(0),
            pacer: Pacer::new(rate_interval),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            idle: Notify::new(),
            cancel,
        }
    }

    /// Admit a task if budget remains and the job is not cancelled.
    ///
    /// Returns `false` when the hard bound is reached; refused tasks are
    /// dropped, not deferred.
    pub fn admit(&self, task: PageTask) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let reserved = self
            .budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| b.checked_sub(1))
            .is_ok();
        if reserved {
            self.queue.lock().push_back(task);
        }
        reserved
    }

    /// Re-enqueue a task that was already admitted (retry path). Does not
    /// consume budget.
    pub fn requeue(&self, task: PageTask) {
        if !self.cancel.is_cancelled() {
            self.queue.lock().push_back(task);
        }
    }

    /// Pop the next task in FIFO order.
    pub fn pop(&self) -> Option<PageTask> {
        self.queue.lock().pop_front()
    }

    /// Number of queued (not yet started) tasks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of in-flight tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Remaining admission budget.
    #[must_use]
    pub fn remaining_budget(&self) -> usize {
        self.budget.load(Ordering::Acquire)
    }

    /// Queue empty and nothing in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.size() == 0 && self.pending() == 0
    }

    /// Wait for a start slot: a concurrency permit plus a pacing grant.
    ///
    /// This is the single primitive combining "at most N in flight" with
    /// "at least the rate interval between starts". Returns `None` when the
    /// job is cancelled while waiting.
    pub async fn acquire_slot(self: Arc<Self>) -> Option<TaskSlot> {
        let permit = tokio::select! {
            () = self.cancel.cancelled() => return None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok()?,
        };

        loop {
            match self.pacer.try_acquire() {
                PaceDecision::Allow => break,
                PaceDecision::Deny { retry_after } => {
                    tokio::select! {
                        () = self.cancel.cancelled() => return None,
                        () = tokio::time::sleep(retry_after) => {}
                    }
                }
            }
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(TaskSlot {
            _permit: permit,
            queue: self,
        })
    }

    /// One-shot idle wait: resolves when the queue has no queued and no
    /// in-flight tasks.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel the job's work: drains queued tasks and wakes idle waiters.
    /// In-flight tasks observe the token at their next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.queue.lock().clear();
        self.notify_if_idle();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn task(path: &str) -> PageTask {
        PageTask::seed(Url::parse(&format!("https://example.com{path}")).expect("test URL"))
    }

    fn queue(budget: usize, concurrency: usize, interval_ms: u64) -> Arc<WorkQueue> {
        Arc::new(WorkQueue::new(
            budget,
            concurrency,
            Duration::from_millis(interval_ms),
            CancellationToken::new(),
        ))
    }

    #[test]
    fn test_fifo_order() {
        let q = queue(10, 2, 0);
        assert!(q.admit(task("/a")));
        assert!(q.admit(task("/b")));
        assert_eq!(q.pop().expect("task").url.path(), "/a");
        assert_eq!(q.pop().expect("task").url.path(), "/b");
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_admission_budget_is_hard_bound() {
        let q = queue(2, 2, 0);
        assert!(q.admit(task("/a")));
        assert!(q.admit(task("/b")));
        assert!(!q.admit(task("/c")));
        assert_eq!(q.size(), 2);
    }

    #[test]
    fn test_requeue_skips_budget() {
        let q = queue(1, 1, 0);
        assert!(q.admit(task("/a")));
        let t = q.pop().expect("task");
        q.requeue(t.bump_attempt());
        assert_eq!(q.size(), 1);
        assert_eq!(q.pop().expect("task").attempt, 1);
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let q = queue(10, 2, 0);
        let s1 = Arc::clone(&q).acquire_slot().await.expect("slot");
        let _s2 = Arc::clone(&q).acquire_slot().await.expect("slot");
        assert_eq!(q.pending(), 2);

        // Third slot only frees up once one guard drops.
        let q2 = Arc::clone(&q);
        let blocked = tokio::spawn(async move { q2.acquire_slot().await.is_some() });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!blocked.is_finished());

        drop(s1);
        assert!(blocked.await.expect("join"));
    }

    #[tokio::test]
    async fn test_rate_interval_between_starts() {
        let q = queue(10, 4, 40);
        let start = Instant::now();
        let _a = Arc::clone(&q).acquire_slot().await.expect("slot");
        let _b = Arc::clone(&q).acquire_slot().await.expect("slot");
        let _c = Arc::clone(&q).acquire_slot().await.expect("slot");
        assert!(start.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn test_idle_notification() {
        let q = queue(10, 2, 0);
        assert!(q.admit(task("/a")));

        let slot = Arc::clone(&q).acquire_slot().await.expect("slot");
        let _t = q.pop().expect("task");
        assert!(!q.is_idle());

        let q2 = Arc::clone(&q);
        let waiter = tokio::spawn(async move {
            q2.wait_idle().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(slot);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("idle should be signalled")
            .expect("waiter should not panic");
    }

    #[tokio::test]
    async fn test_cancel_drains_and_blocks_admission() {
        let q = queue(10, 2, 0);
        assert!(q.admit(task("/a")));
        q.cancel();
        assert_eq!(q.size(), 0);
        assert!(!q.admit(task("/b")));
        assert!(Arc::clone(&q).acquire_slot().await.is_none());
    }
}
