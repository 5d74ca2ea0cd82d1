//! Page title selection.
//!
//! Tries the places documentation sites actually put titles, most specific
//! first: an `<h1>` inside the content container, then metadata, then the
//! document `<title>`, then any `<h1>` at all.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static CONTENT_H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("main h1, article h1, .content h1")
        .expect("BUG: hardcoded content-h1 selector is invalid")
});

static META_TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[name='title']").expect("BUG: hardcoded meta-title selector is invalid")
});

static OG_TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[property='og:title']")
        .expect("BUG: hardcoded og-title selector is invalid")
});

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("BUG: hardcoded title selector is invalid"));

static ANY_H1_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("BUG: hardcoded h1 selector is invalid"));

/// Fallback when the document offers nothing usable.
const UNTITLED: &str = "Untitled Page";

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Select the best available title for a page.
#[must_use]
pub fn select_title(doc: &Html) -> String {
    if let Some(h1) = doc.select(&CONTENT_H1_SELECTOR).next() {
        let text = collapse_ws(&h1.text().collect::<String>());
        if !text.is_empty() {
            return text;
        }
    }

    for selector in [&*META_TITLE_SELECTOR, &*OG_TITLE_SELECTOR] {
        if let Some(meta) = doc.select(selector).next()
            && let Some(content) = meta.value().attr("content")
        {
            let text = collapse_ws(content);
            if !text.is_empty() {
                return text;
            }
        }
    }

    if let Some(title) = doc.select(&TITLE_SELECTOR).next() {
        // Site names ride after a pipe: "Page Title | Site Name".
        let raw = title.text().collect::<String>();
        let text = collapse_ws(raw.split('|').next().unwrap_or(&raw));
        if !text.is_empty() {
            return text;
        }
    }

    if let Some(h1) = doc.select(&ANY_H1_SELECTOR).next() {
        let text = collapse_ws(&h1.text().collect::<String>());
        if !text.is_empty() {
            return text;
        }
    }

    UNTITLED.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_of(html: &str) -> String {
        select_title(&Html::parse_document(html))
    }

    #[test]
    fn test_prefers_content_h1() {
        let html = r"
            <head><title>Doc Title | Site</title></head>
            <body><h1>Stray</h1><main><h1>Content Heading</h1></main></body>
        ";
        assert_eq!(title_of(html), "Content Heading");
    }

    #[test]
    fn test_meta_title_beats_document_title() {
        let html = r#"
            <head>
                <meta name="title" content="Meta Title">
                <title>Doc Title</title>
            </head>
            <body><p>x</p></body>
        "#;
        assert_eq!(title_of(html), "Meta Title");
    }

    #[test]
    fn test_og_title_fallback() {
        let html = r#"
            <head><meta property="og:title" content="OG Title"><title>Doc</title></head>
            <body></body>
        "#;
        assert_eq!(title_of(html), "OG Title");
    }

    #[test]
    fn test_document_title_truncated_at_pipe() {
        let html = "<head><title>Install Guide | Example Docs</title></head><body></body>";
        assert_eq!(title_of(html), "Install Guide");
    }

    #[test]
    fn test_any_h1_fallback() {
        let html = "<body><div><h1>Loose Heading</h1></div></body>";
        assert_eq!(title_of(html), "Loose Heading");
    }

    #[test]
    fn test_untitled_fallback() {
        assert_eq!(title_of("<body><p>no title anywhere</p></body>"), "Untitled Page");
    }
}
