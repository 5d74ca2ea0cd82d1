//! docpress: a documentation crawler service.
//!
//! Given a seed URL, a job discovers, fetches, and extracts the main prose
//! of a documentation site, converts each page to Markdown, streams
//! progress over a resumable SSE event stream, and finalizes one
//! concatenated Markdown corpus fit for pasting into an LLM prompt.

pub mod api;
pub mod config;
pub mod dedup;
pub mod events;
pub mod extractor;
pub mod fetcher;
pub mod jobs;
pub mod queue;
pub mod server_config;
pub mod store;
pub mod url_policy;

pub use config::{CrawlOptions, JobConfig, build_job_config};
pub use dedup::DedupCache;
pub use events::{JobEvent, JobEventBus, follow_events};
pub use extractor::{ExtractedPage, extract_page};
pub use fetcher::{FetchError, FetchedPage, Fetcher};
pub use jobs::{JobHandle, JobRegistry, JobRunner};
pub use queue::{PaceDecision, Pacer, PageTask, WorkQueue};
pub use server_config::ServerConfig;
pub use store::{
    EventRecord, JobCounters, JobKey, JobRecord, JobStatus, JobStore, MemoryStore, PageResult,
    PageStatus,
};
pub use url_policy::{dedup_key, normalize_url, should_crawl};
