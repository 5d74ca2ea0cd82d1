//! Content extraction: HTML in, compact Markdown out
//!
//! The pipeline per page: pick a title, isolate the main content container,
//! render it to Markdown while skipping layout chrome, normalize
//! whitespace, and compute the quality verdict and content hash. All of it
//! is synchronous; callers parse-and-extract in one step so the DOM never
//! crosses an await point.

mod main_content;
mod markdown;
mod quality;
mod title;

use scraper::Html;
use url::Url;

use crate::config::JobConfig;
use crate::url_policy::extract_link_candidates;

pub use main_content::MAX_HTML_SIZE;
pub use quality::{content_hash, normalize_markdown, quality_gate, word_count};

/// Errors from the extraction pipeline.
///
/// The HTML parser itself is error-tolerant and never fails; what can go
/// wrong is input hygiene.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("HTML input too large: {size} bytes exceeds {limit} byte cap")]
    InputTooLarge { size: usize, limit: usize },
}

/// The extracted form of one page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub title: String,
    pub markdown: String,
    pub word_count: usize,
    pub content_hash: u64,
    /// `None` when the page passed the quality gate, otherwise the reason
    /// it should be recorded as skipped.
    pub skip_reason: Option<String>,
}

/// Extract a page and harvest its in-scope child links in one parse.
///
/// # Arguments
/// * `html` - Raw response body
/// * `base` - URL the page was fetched from
/// * `child_depth` - Depth discovered links would be crawled at
/// * `cfg` - Job configuration
///
/// # Returns
/// * `Ok((page, links))` - Extraction result plus deduplicated child URLs
/// * `Err(ExtractError)` - Input exceeded the size cap
pub fn extract_page(
    html: &str,
    base: &Url,
    child_depth: usize,
    cfg: &JobConfig,
) -> Result<(ExtractedPage, Vec<Url>), ExtractError> {
    if html.len() > MAX_HTML_SIZE {
        return Err(ExtractError::InputTooLarge {
            size: html.len(),
            limit: MAX_HTML_SIZE,
        });
    }

    let doc = Html::parse_document(html);

    let title = title::select_title(&doc);
    let main = main_content::select_main_content(&doc);
    let raw_markdown = match main {
        Some(el) => markdown::render_markdown(el),
        None => String::new(),
    };
    let markdown = quality::normalize_markdown(&raw_markdown);

    let skip_reason = quality::quality_gate(&markdown, cfg.options.min_markdown_bytes()).err();
    let page = ExtractedPage {
        title,
        word_count: quality::word_count(&markdown),
        content_hash: quality::content_hash(&markdown),
        markdown,
        skip_reason,
    };

    let links = extract_link_candidates(&doc, base, child_depth, cfg);

    Ok((page, links))
}
