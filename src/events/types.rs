//! Event taxonomy for the per-job stream.

use serde::{Deserialize, Serialize};

use crate::store::JobCounters;

/// Events emitted over a job's lifetime.
///
/// Serialized with an `event_type` tag so a payload is self-describing even
/// when read straight out of the durable log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Sent to a subscriber when its stream attaches. Never persisted;
    /// every reconnect gets a fresh one.
    StreamConnected { job_id: String, last_event_id: u64 },

    /// A URL's task began.
    UrlStarted { url: String, depth: u32 },

    /// A page was extracted and its result stored.
    UrlCrawled {
        url: String,
        title: String,
        word_count: u64,
        depth: u32,
    },

    /// A URL failed permanently (retries exhausted or non-retryable).
    UrlFailed {
        url: String,
        error: String,
        error_kind: String,
        attempts: u32,
    },

    /// New in-scope URLs were admitted to the frontier.
    UrlsDiscovered {
        parent_url: String,
        count: usize,
        urls: Vec<String>,
    },

    /// Counter snapshot, emitted after every page outcome.
    Progress { counters: JobCounters },

    /// Periodic wall-clock notice while the job runs.
    TimeUpdate { elapsed_ms: u64, remaining_ms: u64 },

    /// Terminal: the job finished with at least one ok page.
    JobCompleted {
        counters: JobCounters,
        total_words: u64,
        duration_ms: u64,
    },

    /// Terminal: no ok pages and a non-retryable seed failure.
    JobFailed { error: String, counters: JobCounters },

    /// Terminal: the wall-clock deadline elapsed first.
    JobTimeout { counters: JobCounters },

    /// Terminal: cancelled by the owner.
    JobCancelled { counters: JobCounters },
}

impl JobEvent {
    /// Stable wire name, also used as the SSE `event:` field.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StreamConnected { .. } => "stream_connected",
            Self::UrlStarted { .. } => "url_started",
            Self::UrlCrawled { .. } => "url_crawled",
            Self::UrlFailed { .. } => "url_failed",
            Self::UrlsDiscovered { .. } => "urls_discovered",
            Self::Progress { .. } => "progress",
            Self::TimeUpdate { .. } => "time_update",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::JobTimeout { .. } => "job_timeout",
            Self::JobCancelled { .. } => "job_cancelled",
        }
    }

    /// Terminal events close the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::JobCompleted { .. }
                | Self::JobFailed { .. }
                | Self::JobTimeout { .. }
                | Self::JobCancelled { .. }
        )
    }

    /// JSON payload for the durable log and the SSE `data:` field.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Whether a persisted event type is terminal. Mirror of
/// [`JobEvent::is_terminal`] for records read back from the log.
#[must_use]
pub fn is_terminal_event_type(event_type: &str) -> bool {
    matches!(
        event_type,
        "job_completed" | "job_failed" | "job_timeout" | "job_cancelled"
    )
}
