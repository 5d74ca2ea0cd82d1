//! Per-job dedup cache
//!
//! Two sets per job: seen URLs (by stable dedup key) and seen content
//! hashes. Both are shared by every worker of the job and accessed through
//! atomic insert-as-test primitives, so the sets themselves are the only
//! cycle-breaker the frontier needs. Lifetime is the job's lifetime plus a
//! grace period; the registry calls [`DedupCache::clear`] on eviction.

use dashmap::DashSet;
use url::Url;

use crate::url_policy::dedup_key;

/// Per-job sets of seen URLs and seen content hashes.
#[derive(Debug, Default)]
pub struct DedupCache {
    seen_urls: DashSet<String>,
    seen_hashes: DashSet<u64>,
}

impl DedupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert URLs, returning the subset that was not previously present.
    ///
    /// Insertion is atomic per URL with respect to concurrent callers: for
    /// any given URL, exactly one caller sees it in the returned subset.
    /// Returned order follows input order.
    #[must_use]
    pub fn add_urls(&self, urls: Vec<Url>) -> Vec<Url> {
        urls.into_iter()
            .filter(|url| self.seen_urls.insert(dedup_key(url.as_str())))
            .collect()
    }

    /// Whether a single URL has been seen (without inserting it).
    #[must_use]
    pub fn contains_url(&self, url: &Url) -> bool {
        self.seen_urls.contains(&dedup_key(url.as_str()))
    }

    /// Record a content hash; returns `true` when it was new.
    pub fn add_hash(&self, hash: u64) -> bool {
        self.seen_hashes.insert(hash)
    }

    /// Whether a content hash has been recorded.
    #[must_use]
    pub fn has_hash(&self, hash: u64) -> bool {
        self.seen_hashes.contains(&hash)
    }

    /// Number of distinct URLs seen so far.
    #[must_use]
    pub fn seen_url_count(&self) -> usize {
        self.seen_urls.len()
    }

    /// Drop both sets. Called on terminal state after the grace period.
    pub fn clear(&self) {
        self.seen_urls.clear();
        self.seen_hashes.clear();
    }
}
