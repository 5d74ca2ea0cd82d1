//! Option and configuration types for crawl jobs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Enumerated per-job options, as accepted in the job-creation request body.
///
/// Unknown keys are rejected at deserialization time so a typo in a client
/// request fails loudly instead of silently running with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CrawlOptions {
    /// Hard bound on the number of URLs admitted to the queue.
    pub max_pages: usize,

    /// Maximum link depth from the seed (0 = seed only).
    pub max_depth: usize,

    /// Content quality knob, 0-100. The minimum accepted Markdown length in
    /// bytes is `quality_threshold * 10`, so the default of 20 requires at
    /// least 200 bytes of rendered prose.
    pub quality_threshold: u8,

    /// Per-request deadline in milliseconds.
    pub timeout_ms_per_request: u64,

    /// Minimum delay between task starts within this job, in milliseconds.
    pub rate_limit_ms: u64,

    /// Maximum number of in-flight requests for this job. Range 1-10.
    pub max_concurrent_requests: usize,

    /// Keep URL fragments during normalization.
    pub include_anchors: bool,

    /// Hosts the crawl may touch. Empty means "the seed's host".
    pub allowed_hosts: Vec<String>,

    /// Regex patterns; a URL path matching any of them is out of scope.
    pub exclude_patterns: Vec<String>,

    /// Restrict the crawl to descendants of the seed path.
    pub respect_path_prefix: bool,

    /// Allow links to hosts outside `allowed_hosts`.
    pub follow_external_links: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: 2,
            quality_threshold: 20,
            timeout_ms_per_request: 30_000,
            rate_limit_ms: 1_000,
            max_concurrent_requests: 3,
            include_anchors: false,
            allowed_hosts: Vec::new(),
            exclude_patterns: Vec::new(),
            respect_path_prefix: true,
            follow_external_links: false,
        }
    }
}

impl CrawlOptions {
    /// Minimum accepted Markdown length in bytes for the quality gate.
    #[must_use]
    pub fn min_markdown_bytes(&self) -> usize {
        usize::from(self.quality_threshold) * 10
    }

    /// Per-request deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms_per_request)
    }

    /// Minimum inter-start delay as a [`Duration`].
    #[must_use]
    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

/// Validated configuration a job runs with.
///
/// Built once by [`super::build_job_config`]; everything that can fail
/// (seed parsing, pattern compilation) has already failed there, so the
/// engine's hot path never re-validates.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Canonicalized seed URL.
    pub seed: Url,

    /// The options as requested (post-validation).
    pub options: CrawlOptions,

    /// Resolved host scope: the requested hosts, or the seed host.
    pub allowed_hosts: HashSet<String>,

    /// Compiled exclude patterns, compiled once at job creation to keep
    /// regex compilation out of the per-link hot path.
    pub exclude_patterns: Vec<regex::Regex>,

    /// Wall-clock deadline for the whole job.
    pub job_deadline: Duration,
}

impl JobConfig {
    /// Path prefix that in-scope URLs must live under when
    /// `respect_path_prefix` is set.
    #[must_use]
    pub fn seed_path(&self) -> &str {
        self.seed.path()
    }
}
