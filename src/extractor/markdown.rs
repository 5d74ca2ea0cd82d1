//! DOM to Markdown rendering.
//!
//! The renderer walks the selected content container and emits compact
//! Markdown directly. Chrome elements (scripts, navigation, sidebars, share
//! widgets, hidden nodes) are filtered here, during the walk, rather than by
//! rewriting the HTML first. Link targets are dropped (`[text]`) and images
//! reduced to `[IMAGE: alt]`; both exist to save prompt tokens.

use scraper::ElementRef;
use scraper::node::Node;

/// Elements whose whole subtree is discarded.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "link", "meta", "template", "object",
    "embed", "canvas", "video", "audio", "dialog", "button", "input", "select", "textarea",
    "svg", "nav", "header", "footer", "aside",
];

/// class/id tokens that mark non-content containers.
const SKIP_TOKENS: &[&str] = &[
    "sidebar",
    "toc",
    "table-of-contents",
    "breadcrumb",
    "breadcrumbs",
    "menu",
    "comment",
    "comments",
    "comment-section",
    "share",
    "social",
    "ad",
    "ads",
    "advert",
    "advertisement",
    "copy",
    "copy-button",
    "copy-to-clipboard",
    "export",
    "powered-by",
];

/// Elements rendered in-line within the surrounding text run.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "i", "img", "kbd",
    "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
    "wbr", "br",
];

fn has_skip_token(value: &str) -> bool {
    value
        .split_whitespace()
        .any(|token| SKIP_TOKENS.contains(&token.to_ascii_lowercase().as_str()))
}

/// Whether an element (and its subtree) is layout chrome to discard.
fn is_skippable(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if SKIP_TAGS.contains(&value.name()) {
        return true;
    }
    if matches!(value.attr("role"), Some("navigation") | Some("presentation")) {
        return true;
    }
    if value.attr("aria-hidden") == Some("true") {
        return true;
    }
    if value.attr("class").is_some_and(has_skip_token) {
        return true;
    }
    if let Some(id) = value.attr("id")
        && SKIP_TOKENS.contains(&id.to_ascii_lowercase().as_str())
    {
        return true;
    }
    false
}

fn is_inline_tag(name: &str) -> bool {
    INLINE_TAGS.contains(&name)
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render the selected content container to Markdown.
///
/// Output is raw in the sense that consecutive blank lines may still occur;
/// callers run it through whitespace normalization afterwards.
#[must_use]
pub fn render_markdown(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    render_blocks(root, &mut out);
    out
}

/// Walk an element's children, accumulating inline runs into implicit
/// paragraphs and dispatching block elements to their renderers.
fn render_blocks(el: ElementRef<'_>, out: &mut String) {
    let mut inline = String::new();

    for child in el.children() {
        match child.value() {
            Node::Text(text) => inline.push_str(text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_skippable(child_el) {
                    continue;
                }
                let name = child_el.value().name();
                if is_inline_tag(name) {
                    render_inline(child_el, &mut inline);
                } else {
                    flush_paragraph(&mut inline, out);
                    render_block(child_el, out);
                }
            }
            _ => {}
        }
    }

    flush_paragraph(&mut inline, out);
}

fn flush_paragraph(inline: &mut String, out: &mut String) {
    let text = collapse_ws(inline);
    inline.clear();
    if !text.is_empty() {
        out.push_str(&text);
        out.push_str("\n\n");
    }
}

fn render_block(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = collect_inline(el);
            if !text.is_empty() {
                out.push_str(&"#".repeat(level));
                out.push(' ');
                out.push_str(&text);
                out.push_str("\n\n");
            }
        }
        "p" => {
            let text = collect_inline(el);
            if !text.is_empty() {
                out.push_str(&text);
                out.push_str("\n\n");
            }
        }
        "pre" => render_code_block(el, out),
        "ul" => {
            render_list(el, out, None);
            out.push('\n');
        }
        "ol" => {
            render_list(el, out, Some(1));
            out.push('\n');
        }
        "blockquote" => {
            let mut inner = String::new();
            render_blocks(el, &mut inner);
            let inner = inner.trim_end();
            if !inner.is_empty() {
                for line in inner.lines() {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push('\n');
            }
        }
        "hr" => out.push_str("----\n\n"),
        // Any other block element: descend, blank-line separation comes
        // from the children's own renderers.
        _ => render_blocks(el, out),
    }
}

fn render_code_block(el: ElementRef<'_>, out: &mut String) {
    let text: String = el.text().collect();
    let text = text.trim_matches('\n').trim_end();
    if text.is_empty() {
        return;
    }
    let lang = infer_language(el).unwrap_or_default();
    out.push_str("```");
    out.push_str(&lang);
    out.push('\n');
    out.push_str(text);
    out.push_str("\n```\n\n");
}

/// Infer a fence language from `class="language-x"` / `class="lang-x"` /
/// `data-lang` on the `<pre>` or a nested `<code>`.
fn infer_language(pre: ElementRef<'_>) -> Option<String> {
    fn from_element(el: ElementRef<'_>) -> Option<String> {
        if let Some(lang) = el.value().attr("data-lang") {
            let lang = lang.trim();
            if !lang.is_empty() {
                return Some(lang.to_ascii_lowercase());
            }
        }
        if let Some(class) = el.value().attr("class") {
            for token in class.split_whitespace() {
                if let Some(lang) = token
                    .strip_prefix("language-")
                    .or_else(|| token.strip_prefix("lang-"))
                {
                    if !lang.is_empty() {
                        return Some(lang.to_ascii_lowercase());
                    }
                }
            }
        }
        None
    }

    if let Some(lang) = from_element(pre) {
        return Some(lang);
    }
    pre.children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == "code")
        .and_then(from_element)
}

/// Flattened list rendering: every item becomes one `- ` or `N. ` line,
/// nested lists continue on following lines at the same level.
fn render_list(el: ElementRef<'_>, out: &mut String, ordered_from: Option<usize>) {
    let mut counter = ordered_from.unwrap_or(0);

    for child in el.children() {
        let Some(li) = ElementRef::wrap(child) else {
            continue;
        };
        if li.value().name() != "li" || is_skippable(li) {
            continue;
        }

        let mut item_text = String::new();
        let mut nested: Vec<ElementRef<'_>> = Vec::new();
        for li_child in li.children() {
            match li_child.value() {
                Node::Text(text) => item_text.push_str(text),
                Node::Element(_) => {
                    let Some(inner) = ElementRef::wrap(li_child) else {
                        continue;
                    };
                    if is_skippable(inner) {
                        continue;
                    }
                    let inner_name = inner.value().name();
                    if inner_name == "ul" || inner_name == "ol" {
                        nested.push(inner);
                    } else if is_inline_tag(inner_name) {
                        render_inline(inner, &mut item_text);
                    } else {
                        // Block content inside an item is flattened into
                        // the item line.
                        item_text.push(' ');
                        item_text.push_str(&collect_inline(inner));
                    }
                }
                _ => {}
            }
        }

        let line = collapse_ws(&item_text);
        if !line.is_empty() {
            if ordered_from.is_some() {
                out.push_str(&format!("{counter}. {line}\n"));
                counter += 1;
            } else {
                out.push_str(&format!("- {line}\n"));
            }
        }

        for list in nested {
            let nested_ordered = (list.value().name() == "ol").then_some(1);
            render_list(list, out, nested_ordered);
        }
    }
}

/// Render one inline element into the current text run.
fn render_inline(el: ElementRef<'_>, buf: &mut String) {
    match el.value().name() {
        "code" => {
            let text = collapse_ws(&el.text().collect::<String>());
            if !text.is_empty() {
                buf.push('`');
                buf.push_str(&text);
                buf.push('`');
            }
        }
        "a" => {
            let text = collect_inline(el);
            if !text.is_empty() {
                buf.push('[');
                buf.push_str(&text);
                buf.push(']');
            }
        }
        "img" => {
            let alt = el.value().attr("alt").map(str::trim).unwrap_or("");
            if alt.is_empty() {
                buf.push_str("[IMAGE]");
            } else {
                buf.push_str(&format!("[IMAGE: {alt}]"));
            }
            buf.push(' ');
        }
        "br" => buf.push(' '),
        _ => {
            for child in el.children() {
                match child.value() {
                    Node::Text(text) => buf.push_str(text),
                    Node::Element(_) => {
                        let Some(inner) = ElementRef::wrap(child) else {
                            continue;
                        };
                        if !is_skippable(inner) {
                            render_inline(inner, buf);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Collect an element's content as one collapsed inline string.
fn collect_inline(el: ElementRef<'_>) -> String {
    let mut buf = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(_) => {
                let Some(inner) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_skippable(inner) {
                    continue;
                }
                if is_inline_tag(inner.value().name()) {
                    render_inline(inner, &mut buf);
                } else {
                    buf.push(' ');
                    buf.push_str(&collect_inline(inner));
                    buf.push(' ');
                }
            }
            _ => {}
        }
    }
    collapse_ws(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn render(html: &str) -> String {
        let doc = Html::parse_fragment(html);
        render_markdown(doc.root_element())
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let md = render("<h1>Title</h1><p>First para.</p><h3>Sub</h3><p>Second.</p>");
        assert_eq!(md, "# Title\n\nFirst para.\n\n### Sub\n\nSecond.\n\n");
    }

    #[test]
    fn test_code_block_with_language() {
        let md = render(r#"<pre><code class="language-rust">fn main() {}</code></pre>"#);
        assert_eq!(md, "```rust\nfn main() {}\n```\n\n");
    }

    #[test]
    fn test_code_block_data_lang() {
        let md = render(r#"<pre data-lang="toml">[package]</pre>"#);
        assert_eq!(md, "```toml\n[package]\n```\n\n");
    }

    #[test]
    fn test_code_block_preserves_newlines() {
        let md = render("<pre><code>line one\n    line two</code></pre>");
        assert!(md.contains("line one\n    line two"));
    }

    #[test]
    fn test_inline_code_backticks() {
        let md = render("<p>Run <code>cargo test</code> locally.</p>");
        assert_eq!(md, "Run `cargo test` locally.\n\n");
    }

    #[test]
    fn test_links_drop_targets() {
        let md = render(r#"<p>See the <a href="/install">install guide</a> first.</p>"#);
        assert_eq!(md, "See the [install guide] first.\n\n");
    }

    #[test]
    fn test_images_reduced_to_alt() {
        let md = render(r#"<p><img src="/x.png" alt="architecture diagram"> caption</p>"#);
        assert_eq!(md, "[IMAGE: architecture diagram] caption\n\n");
    }

    #[test]
    fn test_unordered_list_flattened() {
        let md = render("<ul><li>one</li><li>two <ul><li>nested</li></ul></li></ul>");
        assert_eq!(md, "- one\n- two\n- nested\n\n");
    }

    #[test]
    fn test_ordered_list_numbering() {
        let md = render("<ol><li>first</li><li>second</li><li>third</li></ol>");
        assert_eq!(md, "1. first\n2. second\n3. third\n\n");
    }

    #[test]
    fn test_blockquote_prefixing() {
        let md = render("<blockquote><p>quoted line</p></blockquote>");
        assert_eq!(md, "> quoted line\n\n");
    }

    #[test]
    fn test_hr() {
        let md = render("<p>a</p><hr><p>b</p>");
        assert_eq!(md, "a\n\n----\n\nb\n\n");
    }

    #[test]
    fn test_scripts_and_styles_dropped() {
        let md = render("<p>keep</p><script>alert(1)</script><style>p{}</style>");
        assert_eq!(md, "keep\n\n");
    }

    #[test]
    fn test_navigation_chrome_dropped() {
        let md = render(
            r#"<nav>menu</nav><div class="sidebar">side</div>
               <div aria-hidden="true">hidden</div>
               <div role="presentation">deco</div>
               <p>content</p>"#,
        );
        assert_eq!(md, "content\n\n");
    }

    #[test]
    fn test_share_and_ad_widgets_dropped() {
        let md = render(
            r#"<div class="share">share me</div>
               <div class="ad">buy things</div>
               <div id="toc">contents</div>
               <p>prose</p>"#,
        );
        assert_eq!(md, "prose\n\n");
    }

    #[test]
    fn test_loose_text_becomes_paragraph() {
        let md = render("<div>loose text <strong>with bold</strong> inside</div>");
        assert_eq!(md, "loose text with bold inside\n\n");
    }

    #[test]
    fn test_empty_pre_dropped() {
        let md = render("<pre>   </pre><p>after</p>");
        assert_eq!(md, "after\n\n");
    }
}
