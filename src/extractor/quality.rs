//! Markdown normalization, the quality gate, and content hashing.

use std::sync::LazyLock;

use regex::Regex;
use xxhash_rust::xxh3::xxh3_64;

/// Residual HTML tags that occasionally leak through malformed markup.
/// Restricted to known tag names so inline generics like `Vec<T>` survive.
static RESIDUAL_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:div|span|p|a|img|br|hr|table|thead|tbody|tr|td|th|ul|ol|li|h[1-6]|em|strong|b|i|u|section|article|figure|figcaption|iframe|script|style|font|center|small|sup|sub)\b[^>]*>",
    )
    .expect("RESIDUAL_TAG_RE: hardcoded regex is valid")
});

/// Normalize rendered Markdown.
///
/// Right-trims every line, collapses runs of blank lines down to one (so at
/// most two consecutive newlines), strips residual HTML tags outside fenced
/// code blocks, and trims the result. Fence content is left untouched apart
/// from trailing-whitespace removal.
#[must_use]
pub fn normalize_markdown(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_fence = false;
    let mut blank_run = 0usize;

    for line in raw.lines() {
        let trimmed = line.trim_end();

        let is_fence_marker = trimmed.trim_start().starts_with("```");
        let rendered = if is_fence_marker || in_fence {
            trimmed.to_string()
        } else {
            RESIDUAL_TAG_RE.replace_all(trimmed, "").trim_end().to_string()
        };
        if is_fence_marker {
            in_fence = !in_fence;
        }

        if rendered.is_empty() && !in_fence && !is_fence_marker {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }

        out.push_str(&rendered);
        out.push('\n');
    }

    out.trim().to_string()
}

/// Check a page's Markdown against the quality gate.
///
/// A page passes when it is at least `min_bytes` long and contains at least
/// one heading, paragraph, or code block.
///
/// # Returns
/// * `Ok(())` - Page is worth keeping
/// * `Err(reason)` - Human-readable skip reason
pub fn quality_gate(markdown: &str, min_bytes: usize) -> Result<(), String> {
    if markdown.len() < min_bytes {
        return Err(format!(
            "content too short: {} bytes < {min_bytes} byte minimum",
            markdown.len()
        ));
    }

    let has_heading = markdown.lines().any(|l| l.starts_with('#'));
    let has_code = markdown.contains("```");
    let has_paragraph = markdown.lines().any(|l| {
        let t = l.trim();
        !t.is_empty() && !t.starts_with('#') && !t.starts_with("```")
    });

    if has_heading || has_paragraph || has_code {
        Ok(())
    } else {
        Err("no headings, paragraphs, or code blocks".to_string())
    }
}

/// 64-bit content hash for near-duplicate suppression.
///
/// Case and whitespace differences do not change the hash, so two renderings
/// of the same prose collide by design.
#[must_use]
pub fn content_hash(markdown: &str) -> u64 {
    let normalized = markdown
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    xxh3_64(normalized.as_bytes())
}

/// Whitespace-delimited word count of the rendered Markdown.
#[must_use]
pub fn word_count(markdown: &str) -> usize {
    markdown.split_whitespace().count()
}
