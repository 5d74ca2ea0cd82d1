//! The in-scope predicate for a job.

use url::Url;

use crate::config::JobConfig;

/// Path suffixes that never hold crawlable prose: images, archives, media,
/// stylesheets, scripts, and machine-readable feeds.
const DISALLOWED_EXTENSIONS: &[&str] = &[
    // Images
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".bmp", ".avif",
    // Archives
    ".zip", ".tar", ".gz", ".tgz", ".bz2", ".7z", ".rar", ".xz",
    // Media
    ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".mkv", ".wav", ".ogg",
    // Stylesheets and scripts
    ".css", ".js", ".mjs", ".map",
    // Feeds and data
    ".json", ".xml", ".rss", ".atom",
];

fn has_disallowed_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    DISALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Decide whether a normalized URL is in scope for a job at a given depth.
///
/// All clauses must hold:
/// 1. scheme is `http` or `https`
/// 2. host is allowed (or external links are enabled)
/// 3. no exclude pattern matches the path
/// 4. the path suffix is not a known non-content extension
/// 5. with `respect_path_prefix`, the path is the seed path or a descendant
/// 6. depth does not exceed `max_depth`
#[must_use]
pub fn should_crawl(url: &Url, depth: usize, cfg: &JobConfig) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    if !cfg.options.follow_external_links {
        let host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return false,
        };
        if !cfg.allowed_hosts.contains(&host) {
            return false;
        }
    }

    let path = url.path();
    if cfg.exclude_patterns.iter().any(|re| re.is_match(path)) {
        return false;
    }

    if has_disallowed_extension(path) {
        return false;
    }

    if cfg.options.respect_path_prefix {
        let seed_path = cfg.seed_path();
        // The seed path itself is in scope; descendants must cross a
        // segment boundary so /docs does not admit /docs-old.
        let is_descendant = if seed_path.ends_with('/') {
            path.starts_with(seed_path)
        } else {
            path == seed_path || path.starts_with(&format!("{seed_path}/"))
        };
        if !is_descendant {
            return false;
        }
    }

    depth <= cfg.options.max_depth
}
