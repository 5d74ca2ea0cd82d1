//! Validation of [`CrawlOptions`] into a runnable [`JobConfig`].

use std::collections::HashSet;
use std::time::Duration;

use super::types::{CrawlOptions, JobConfig};
use crate::url_policy::normalize_url;

/// Upper bound on `max_pages` per job; keeps a single job from holding an
/// unbounded frontier in memory.
const MAX_PAGES_CEILING: usize = 1_000;

/// Upper bound on `max_depth`; documentation sites rarely nest deeper and a
/// runaway depth multiplies the frontier.
const MAX_DEPTH_CEILING: usize = 32;

/// Allowed range for per-job concurrency.
const CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

/// Errors produced while validating job options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid seed URL {url:?}: {reason}")]
    InvalidSeed { url: String, reason: String },

    #[error("option {name} out of range: {reason}")]
    OptionOutOfRange { name: &'static str, reason: String },

    #[error("exclude pattern {pattern:?} failed to compile: {source}")]
    BadExcludePattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Validate options and resolve them against a seed URL.
///
/// # Arguments
/// * `seed` - Raw seed URL as submitted by the client
/// * `options` - Wire-level options (already deserialized)
/// * `job_deadline` - Process-level default wall-clock deadline
///
/// # Returns
/// * `Ok(JobConfig)` - Seed canonicalized, hosts resolved, patterns compiled
/// * `Err(ConfigError)` - First validation failure encountered
pub fn build_job_config(
    seed: &str,
    options: CrawlOptions,
    job_deadline: Duration,
) -> Result<JobConfig, ConfigError> {
    let seed = normalize_url(seed, None, options.include_anchors).map_err(|e| {
        ConfigError::InvalidSeed {
            url: seed.to_string(),
            reason: e.to_string(),
        }
    })?;

    if options.max_pages == 0 || options.max_pages > MAX_PAGES_CEILING {
        return Err(ConfigError::OptionOutOfRange {
            name: "max_pages",
            reason: format!(
                "{} not in 1..={MAX_PAGES_CEILING}",
                options.max_pages
            ),
        });
    }

    if options.max_depth > MAX_DEPTH_CEILING {
        return Err(ConfigError::OptionOutOfRange {
            name: "max_depth",
            reason: format!("{} exceeds {MAX_DEPTH_CEILING}", options.max_depth),
        });
    }

    if options.quality_threshold > 100 {
        return Err(ConfigError::OptionOutOfRange {
            name: "quality_threshold",
            reason: format!("{} not in 0..=100", options.quality_threshold),
        });
    }

    if options.timeout_ms_per_request == 0 {
        return Err(ConfigError::OptionOutOfRange {
            name: "timeout_ms_per_request",
            reason: "must be nonzero".to_string(),
        });
    }

    if !CONCURRENCY_RANGE.contains(&options.max_concurrent_requests) {
        return Err(ConfigError::OptionOutOfRange {
            name: "max_concurrent_requests",
            reason: format!(
                "{} not in {}..={}",
                options.max_concurrent_requests,
                CONCURRENCY_RANGE.start(),
                CONCURRENCY_RANGE.end()
            ),
        });
    }

    let exclude_patterns = options
        .exclude_patterns
        .iter()
        .map(|p| {
            regex::Regex::new(p).map_err(|source| ConfigError::BadExcludePattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Host scope defaults to the seed's host. Hosts are matched lowercase.
    let allowed_hosts: HashSet<String> = if options.allowed_hosts.is_empty() {
        let seed_host = seed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidSeed {
                url: seed.to_string(),
                reason: "seed URL has no host".to_string(),
            })?
            .to_ascii_lowercase();
        HashSet::from([seed_host])
    } else {
        options
            .allowed_hosts
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect()
    };

    Ok(JobConfig {
        seed,
        options,
        allowed_hosts,
        exclude_patterns,
        job_deadline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deadline() -> Duration {
        Duration::from_secs(300)
    }

    #[test]
    fn test_defaults_build() {
        let cfg = build_job_config("https://docs.example.com/guide/", CrawlOptions::default(), deadline())
            .expect("default options should validate");
        assert_eq!(cfg.options.max_pages, 50);
        assert_eq!(cfg.options.max_depth, 2);
        assert!(cfg.allowed_hosts.contains("docs.example.com"));
        assert_eq!(cfg.seed_path(), "/guide/");
    }

    #[test]
    fn test_zero_max_pages_rejected() {
        let options = CrawlOptions {
            max_pages: 0,
            ..CrawlOptions::default()
        };
        let err = build_job_config("https://example.com/", options, deadline()).unwrap_err();
        assert!(matches!(err, ConfigError::OptionOutOfRange { name: "max_pages", .. }));
    }

    #[test]
    fn test_concurrency_range_enforced() {
        let options = CrawlOptions {
            max_concurrent_requests: 11,
            ..CrawlOptions::default()
        };
        let err = build_job_config("https://example.com/", options, deadline()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OptionOutOfRange { name: "max_concurrent_requests", .. }
        ));
    }

    #[test]
    fn test_bad_exclude_pattern_rejected() {
        let options = CrawlOptions {
            exclude_patterns: vec!["([unclosed".to_string()],
            ..CrawlOptions::default()
        };
        let err = build_job_config("https://example.com/", options, deadline()).unwrap_err();
        assert!(matches!(err, ConfigError::BadExcludePattern { .. }));
    }

    #[test]
    fn test_non_http_seed_rejected() {
        let err = build_job_config("ftp://example.com/", CrawlOptions::default(), deadline())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSeed { .. }));
    }

    #[test]
    fn test_explicit_hosts_lowercased() {
        let options = CrawlOptions {
            allowed_hosts: vec!["Docs.Example.COM".to_string()],
            ..CrawlOptions::default()
        };
        let cfg = build_job_config("https://example.com/", options, deadline())
            .expect("options should validate");
        assert!(cfg.allowed_hosts.contains("docs.example.com"));
    }

    #[test]
    fn test_unknown_option_key_rejected() {
        let err = serde_json::from_str::<CrawlOptions>(r#"{"max_pagez": 3}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
