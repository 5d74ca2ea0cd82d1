//! Per-job politeness pacing.
//!
//! A lock-free minimum-interval limiter: between the start times of any two
//! tasks in the same job at least the configured interval must elapse.
//! Implemented as a compare-and-swap on an atomic next-start timestamp, so
//! the decision path never takes a lock and never sleeps; callers sleep on
//! [`PaceDecision::Deny`] themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pacing decision for the next task start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceDecision {
    /// The caller may start now; the slot has been consumed.
    Allow,
    /// Too soon. Contains the duration to wait before asking again.
    Deny { retry_after: Duration },
}

/// Minimum-interval pacer with isolated state per instance.
#[derive(Debug)]
pub struct Pacer {
    interval_nanos: u64,
    base: Instant,
    /// Earliest permitted start, in nanoseconds since `base`.
    next_start: AtomicU64,
}

impl Pacer {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_nanos: interval.as_nanos() as u64,
            base: Instant::now(),
            next_start: AtomicU64::new(0),
        }
    }

    /// Try to claim the next start slot.
    ///
    /// Lock-free: on CAS contention the loser retries against the fresh
    /// state, and one of the contenders always makes progress.
    pub fn try_acquire(&self) -> PaceDecision {
        if self.interval_nanos == 0 {
            return PaceDecision::Allow;
        }

        let now = self.base.elapsed().as_nanos() as u64;
        let mut current = self.next_start.load(Ordering::Relaxed);

        loop {
            if now < current {
                return PaceDecision::Deny {
                    retry_after: Duration::from_nanos(current - now),
                };
            }

            match self.next_start.compare_exchange_weak(
                current,
                now + self.interval_nanos,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return PaceDecision::Allow,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Wait until a start slot is granted.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                PaceDecision::Allow => return,
                PaceDecision::Deny { retry_after } => tokio::time::sleep(retry_after).await,
            }
        }
    }
}
