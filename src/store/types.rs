//! Durable job-state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CrawlOptions;

/// A job's identity. Every stored key is namespaced by the owning user, so
/// one user can never read or cancel another user's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub user_id: String,
    pub job_id: String,
}

impl JobKey {
    #[must_use]
    pub fn new(user_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            job_id: job_id.into(),
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job:{}:{}", self.user_id, self.job_id)
    }
}

/// Job lifecycle status. Terminal states are sticky; the store's CAS is the
/// only way in, so a job reaches a terminal state at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }
}

/// Per-job progress counters. Invariant: `processed <= queued <= discovered`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    /// Distinct in-scope URLs seen (admitted or refused at the page bound).
    pub discovered: u64,
    /// URLs admitted to the work queue.
    pub queued: u64,
    /// URLs whose task ran to a recorded outcome.
    pub processed: u64,
    /// Pages recorded as skipped (quality, duplicates).
    pub skipped: u64,
    /// Pages recorded as failed.
    pub failed: u64,
}

/// The durable job record: summary, counters, and the final artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub user_id: String,
    pub job_id: String,
    pub seed_url: String,
    pub options: CrawlOptions,
    pub status: JobStatus,
    pub counters: JobCounters,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Concatenated Markdown corpus; set once at finalization.
    pub final_markdown: Option<String>,
}

impl JobRecord {
    #[must_use]
    pub fn new(key: &JobKey, seed_url: String, options: CrawlOptions) -> Self {
        Self {
            user_id: key.user_id.clone(),
            job_id: key.job_id.clone(),
            seed_url,
            options,
            status: JobStatus::Pending,
            counters: JobCounters::default(),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            final_markdown: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> JobKey {
        JobKey::new(self.user_id.clone(), self.job_id.clone())
    }
}

/// Outcome class of one processed URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Ok,
    Failed,
    Skipped,
    Duplicate,
}

/// The durable, per-URL output of a crawl task. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub title: Option<String>,
    pub markdown: Option<String>,
    pub word_count: u64,
    /// Hex form of the 64-bit content hash, present for `ok` pages.
    pub content_hash: Option<String>,
    pub status: PageStatus,
    pub error: Option<String>,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// One appended event in a job's durable log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Strictly monotone per job, starting at 1, gap-free.
    pub event_id: u64,
    pub job_id: String,
    pub user_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
