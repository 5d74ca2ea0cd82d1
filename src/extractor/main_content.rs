//! Main-content container selection.
//!
//! Two-stage selection: a ranked ladder of selectors that documentation
//! frameworks actually use, then a scored fallback over `<div>`/`<section>`
//! candidates when no ladder entry matches. The ladder and the scoring
//! function are contracts: equal inputs must pick equal elements, so both
//! are deterministic and covered by fixtures.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

/// Maximum HTML input size (10 MB). Real documentation pages sit far below
/// this; anything larger is a hostile or broken response.
pub const MAX_HTML_SIZE: usize = 10 * 1024 * 1024;

// ============================================================================
// Ranked content selectors
// ============================================================================

// Parsed once at first access. Hardcoded selectors never fail to parse; if
// one does it is a compile-time bug.

static MAIN_ROLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("main[role='main']").expect("BUG: hardcoded selector main[role='main'] is invalid")
});

static ARTICLE_ROLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("article[role='article']")
        .expect("BUG: hardcoded selector article[role='article'] is invalid")
});

static ROLE_MAIN_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[role='main']").expect("BUG: hardcoded selector [role='main'] is invalid")
});

static MAIN_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main").expect("BUG: hardcoded selector main is invalid"));

static ARTICLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("article").expect("BUG: hardcoded selector article is invalid")
});

static DOCUMENTATION_CONTENT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".documentation-content")
        .expect("BUG: hardcoded selector .documentation-content is invalid")
});

static DOCS_CONTENT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".docs-content").expect("BUG: hardcoded selector .docs-content is invalid")
});

static MARKDOWN_BODY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".markdown-body").expect("BUG: hardcoded selector .markdown-body is invalid")
});

static ARTICLE_CONTENT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".article-content")
        .expect("BUG: hardcoded selector .article-content is invalid")
});

static POST_CONTENT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".post-content").expect("BUG: hardcoded selector .post-content is invalid")
});

static ENTRY_CONTENT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".entry-content").expect("BUG: hardcoded selector .entry-content is invalid")
});

static CONTENT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".content").expect("BUG: hardcoded selector .content is invalid")
});

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("BUG: hardcoded selector body is invalid"));

// ============================================================================
// Scoring fallback
// ============================================================================

static CANDIDATE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div, section").expect("BUG: hardcoded selector div,section is invalid")
});

static P_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("BUG: hardcoded selector p is invalid"));

static HEADING_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6").expect("BUG: hardcoded heading selector is invalid")
});

static CODE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("pre, code").expect("BUG: hardcoded selector pre,code is invalid")
});

static LIST_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("ul, ol").expect("BUG: hardcoded selector ul,ol is invalid")
});

/// Tags that mark layout chrome; a ladder match inside one is not content.
const CHROME_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

const CHROME_MARKERS: &[&str] = &["nav", "header", "footer", "sidebar", "menu"];

fn has_chrome_marker(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    CHROME_MARKERS.iter().any(|m| lower.contains(m))
}

/// True when the element itself or an ancestor is a nav/header/footer
/// variant. Used to reject e.g. `<footer><article>` ladder matches and
/// `.nav-content` class hits.
fn inside_chrome(el: ElementRef<'_>) -> bool {
    let chain = std::iter::once(el).chain(el.ancestors().filter_map(ElementRef::wrap));
    for node in chain {
        let value = node.value();
        if CHROME_TAGS.contains(&value.name()) {
            return true;
        }
        if value.attr("class").is_some_and(has_chrome_marker)
            || value.attr("id").is_some_and(has_chrome_marker)
        {
            return true;
        }
    }
    false
}

fn content_score(el: ElementRef<'_>) -> usize {
    let paragraphs = el.select(&P_SELECTOR).count();
    let headings = el.select(&HEADING_SELECTOR).count();
    let code_blocks = el.select(&CODE_SELECTOR).count();
    let lists = el.select(&LIST_SELECTOR).count();
    let text_len: usize = el.text().map(str::len).sum();

    10 * paragraphs + 15 * headings + 20 * code_blocks + 5 * lists + text_len / 100
}

/// Pick the main content container of a document.
///
/// Selection order:
/// 1. the ranked selector ladder, first match that is not inside chrome
/// 2. the highest-scoring `<div>`/`<section>` candidate
///    (`10*p + 15*h + 20*(pre|code) + 5*(ul|ol) + text_len/100`)
/// 3. `<body>`
///
/// Returns `None` only for documents without a `<body>` (fragments).
#[must_use]
pub fn select_main_content(doc: &Html) -> Option<ElementRef<'_>> {
    let ladder = [
        &*MAIN_ROLE_SELECTOR,
        &*ARTICLE_ROLE_SELECTOR,
        &*ROLE_MAIN_SELECTOR,
        &*MAIN_SELECTOR,
        &*ARTICLE_SELECTOR,
        &*DOCUMENTATION_CONTENT_SELECTOR,
        &*DOCS_CONTENT_SELECTOR,
        &*MARKDOWN_BODY_SELECTOR,
        &*ARTICLE_CONTENT_SELECTOR,
        &*POST_CONTENT_SELECTOR,
        &*ENTRY_CONTENT_SELECTOR,
        &*CONTENT_SELECTOR,
    ];

    for selector in ladder {
        if let Some(el) = doc.select(selector).find(|el| !inside_chrome(*el)) {
            return Some(el);
        }
    }

    // Scored fallback. Ties keep the first candidate in document order so
    // the pick stays deterministic.
    let mut best: Option<(usize, ElementRef<'_>)> = None;
    for candidate in doc.select(&CANDIDATE_SELECTOR) {
        if inside_chrome(candidate) {
            continue;
        }
        let score = content_score(candidate);
        if score > 0 && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, candidate));
        }
    }
    if let Some((_, el)) = best {
        return Some(el);
    }

    doc.select(&BODY_SELECTOR).next()
}
