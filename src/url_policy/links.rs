//! Link-candidate harvesting from parsed documents.

use std::collections::HashSet;
use std::sync::LazyLock;

use log::debug;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::normalize::normalize_url;
use super::scope::should_crawl;
use crate::config::JobConfig;

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href]").expect("BUG: hardcoded CSS selector 'a[href]' is invalid")
});

/// Tags whose subtree is navigation chrome rather than content.
const NAV_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

/// class/id substrings that mark likely-navigation containers.
const NAV_MARKERS: &[&str] = &["nav", "menu", "sidebar", "toc", "breadcrumb"];

fn attr_has_nav_marker(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    NAV_MARKERS.iter().any(|m| lower.contains(m))
}

/// True if the anchor sits inside a likely-navigation region.
fn inside_navigation(anchor: ElementRef<'_>) -> bool {
    for ancestor in anchor.ancestors() {
        let Some(el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        let value = el.value();
        if NAV_TAGS.contains(&value.name()) {
            return true;
        }
        if value.attr("role") == Some("navigation") {
            return true;
        }
        if value.attr("class").is_some_and(attr_has_nav_marker)
            || value.attr("id").is_some_and(attr_has_nav_marker)
        {
            return true;
        }
    }
    false
}

/// Collect the in-scope child URLs of a page.
///
/// All `href` values are resolved against `base`, normalized, filtered by
/// [`should_crawl`] at `child_depth`, and de-duplicated within the page
/// while preserving document order. Anchors inside navigation regions are
/// skipped here, during extraction, so a page's nav bar never counts as
/// discovery.
///
/// # Arguments
/// * `doc` - Parsed document
/// * `base` - URL the document was fetched from
/// * `child_depth` - Depth the discovered links would be crawled at
/// * `cfg` - Job configuration
#[must_use]
pub fn extract_link_candidates(
    doc: &Html,
    base: &Url,
    child_depth: usize,
    cfg: &JobConfig,
) -> Vec<Url> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for anchor in doc.select(&ANCHOR_SELECTOR) {
        if inside_navigation(anchor) {
            continue;
        }

        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.is_empty() {
            continue;
        }

        let url = match normalize_url(href, Some(base), cfg.options.include_anchors) {
            Ok(url) => url,
            Err(e) => {
                debug!("skipping unparseable href {href:?}: {e}");
                continue;
            }
        };

        if !should_crawl(&url, child_depth, cfg) {
            continue;
        }

        if seen.insert(url.to_string()) {
            candidates.push(url);
        }
    }

    candidates
}
