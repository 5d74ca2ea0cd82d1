//! Deterministic URL normalization.
//!
//! Two URLs with equal canonical forms are equal for dedup purposes, so the
//! rules here are the single source of truth for URL identity: lowercase
//! scheme and host, default ports dropped, tracking query keys stripped,
//! remaining query keys sorted, dot segments collapsed, trailing slashes
//! kept (they are significant for path-prefix scoping).

use sha2::{Digest, Sha256};
use url::Url;

/// Query keys that carry tracking state and never affect page content.
const TRACKING_KEYS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "msclkid"];

/// Hex length of a stored dedup key (16 bytes of SHA-256).
const DEDUP_KEY_HEX_LEN: usize = 32;

/// Errors from URL normalization.
#[derive(Debug, thiserror::Error)]
pub enum UrlPolicyError {
    #[error("failed to parse URL: {0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
}

fn is_tracking_key(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_KEYS.contains(&key)
}

/// Canonicalize a URL, optionally resolving it against a base first.
///
/// The output is idempotent: `normalize_url(normalize_url(u))` yields the
/// same URL. Only `http` and `https` URLs are accepted; everything else
/// (`javascript:`, `mailto:`, `data:`, relative URLs without a base) is an
/// error.
///
/// # Arguments
/// * `raw` - URL string as found in a document or request
/// * `base` - Base URL for resolving relative references
/// * `include_anchors` - Keep the fragment instead of dropping it
pub fn normalize_url(
    raw: &str,
    base: Option<&Url>,
    include_anchors: bool,
) -> Result<Url, UrlPolicyError> {
    let mut url = match base {
        Some(base) => base.join(raw.trim())?,
        None => Url::parse(raw.trim())?,
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlPolicyError::UnsupportedScheme(url.scheme().to_string()));
    }

    // The url crate already lowercases scheme and host, strips known default
    // ports, and collapses dot segments on parse. What remains is fragment
    // and query policy.
    if !include_anchors {
        url.set_fragment(None);
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_key(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        // Stable sort: duplicate keys keep their document order.
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    Ok(url)
}

/// Stable dedup key for a canonical URL: SHA-256 truncated to 16 bytes, hex.
#[must_use]
pub fn dedup_key(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(DEDUP_KEY_HEX_LEN);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        normalize_url(raw, None, false)
            .expect("URL should normalize")
            .to_string()
    }

    #[test]
    fn test_lowercases_scheme_and_host() {
        assert_eq!(norm("HTTP://Docs.Example.COM/Path"), "http://docs.example.com/Path");
    }

    #[test]
    fn test_drops_default_ports() {
        assert_eq!(norm("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(norm("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(norm("http://example.com:8080/a"), "http://example.com:8080/a");
    }

    #[test]
    fn test_drops_fragment_by_default() {
        assert_eq!(norm("https://example.com/a#section"), "https://example.com/a");
    }

    #[test]
    fn test_keeps_fragment_when_anchors_enabled() {
        let url = normalize_url("https://example.com/a#section", None, true)
            .expect("URL should normalize");
        assert_eq!(url.as_str(), "https://example.com/a#section");
    }

    #[test]
    fn test_strips_tracking_keys() {
        assert_eq!(
            norm("https://example.com/a?utm_source=x&utm_campaign=y&gclid=123&page=2"),
            "https://example.com/a?page=2"
        );
    }

    #[test]
    fn test_sorts_query_keys() {
        assert_eq!(
            norm("https://example.com/a?z=1&a=2&m=3"),
            "https://example.com/a?a=2&m=3&z=1"
        );
    }

    #[test]
    fn test_drops_empty_query() {
        assert_eq!(norm("https://example.com/a?fbclid=abc"), "https://example.com/a");
    }

    #[test]
    fn test_keeps_trailing_slash() {
        assert_eq!(norm("https://example.com/docs/"), "https://example.com/docs/");
        assert_eq!(norm("https://example.com/docs"), "https://example.com/docs");
    }

    #[test]
    fn test_collapses_dot_segments() {
        assert_eq!(
            norm("https://example.com/a/b/../c/./d"),
            "https://example.com/a/c/d"
        );
    }

    #[test]
    fn test_relative_resolution() {
        let base = normalize_url("https://example.com/docs/guide/", None, false)
            .expect("base should normalize");
        let url = normalize_url("../api/index.html", Some(&base), false)
            .expect("relative URL should resolve");
        assert_eq!(url.as_str(), "https://example.com/docs/api/index.html");
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        for raw in ["javascript:void(0)", "mailto:a@b.c", "data:text/plain,x", "ftp://x/"] {
            assert!(matches!(
                normalize_url(raw, None, false),
                Err(UrlPolicyError::UnsupportedScheme(_))
            ));
        }
    }

    #[test]
    fn test_normalization_idempotent() {
        let once = norm("HTTPS://Example.com:443/a/../b?z=1&utm_source=x&a=2#frag");
        assert_eq!(norm(&once), once);
    }

    #[test]
    fn test_dedup_key_stable_and_truncated() {
        let a = dedup_key("https://example.com/a");
        let b = dedup_key("https://example.com/a");
        let c = dedup_key("https://example.com/b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
