//! Per-job crawl configuration
//!
//! `CrawlOptions` is the wire-level option set accepted on job creation.
//! `JobConfig` is the validated form the engine runs with: seed URL parsed,
//! host scope resolved, exclude patterns precompiled.

mod builder;
mod types;

pub use builder::{ConfigError, build_job_config};
pub use types::{CrawlOptions, JobConfig};
