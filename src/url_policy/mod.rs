//! URL canonicalization and crawl scoping
//!
//! Everything that decides "is this URL the same as that one" and "should
//! this job touch it" lives here: deterministic normalization, stable dedup
//! keys, the in-scope predicate, and link-candidate harvesting from parsed
//! documents.

mod links;
mod normalize;
mod scope;

pub use links::extract_link_candidates;
pub use normalize::{UrlPolicyError, dedup_key, normalize_url};
pub use scope::should_crawl;
