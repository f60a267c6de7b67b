//! HTML cleaner & extractor. Pure functions over an HTML blob.
//!
//! The selector-based removal serializer collects the `NodeId`s matched by
//! a selector, then re-serializes the tree while skipping them, which
//! avoids mutating `scraper`'s read-only DOM.

pub mod branding;
pub mod links_images;
pub mod markdown;
pub mod metadata;

use std::collections::HashSet;

use scraper::node::Node as ScraperNode;
use scraper::{ElementRef, Html, Selector};

pub use branding::{extract_branding, Branding};
pub use links_images::extract_images;
pub use markdown::to_markdown;
pub use metadata::{extract_metadata, PageMetadata};

/// Tags removed unconditionally, regardless of `only_main_content`/`include_tags`.
const ALWAYS_REMOVE: &[&str] = &["script", "style", "nav", "footer", "header", "noscript", "iframe"];

/// Selectors tried, in order, when `only_main_content=true` and no
/// `include_tags` were given.
const MAIN_CONTENT_SELECTORS: &[&str] = &["main", "article", "[role=main]", ".content", "#content"];

/// Clean `html`:
/// 1. Strip `script/style/nav/footer/header/noscript/iframe` unconditionally.
/// 2. Remove every subtree matched by an `exclude_tags` selector (invalid
///    selectors are skipped silently).
/// 3. If `include_tags` is non-empty, collect their matches into a wrapper
///    and return it — this takes precedence over `only_main_content`.
/// 4. Else, if `only_main_content`, return the first main-content selector hit.
/// 5. Else, return `<body>`, or the whole document if there is no body.
pub fn clean(
    html: &str,
    only_main_content: bool,
    include_tags: &[String],
    exclude_tags: &[String],
) -> String {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut to_remove: HashSet<ego_tree::NodeId> = HashSet::new();
    collect_matches(&root, ALWAYS_REMOVE, &mut to_remove);
    for selector in exclude_tags {
        if let Ok(parsed) = Selector::parse(selector) {
            for el in root.select(&parsed) {
                to_remove.insert(el.id());
            }
        }
    }

    if !include_tags.is_empty() {
        let mut wrapper = String::from("<div>");
        for selector in include_tags {
            let Ok(parsed) = Selector::parse(selector) else { continue };
            for el in root.select(&parsed) {
                if to_remove.contains(&el.id()) {
                    continue;
                }
                serialize_excluding(&el, &to_remove, &mut wrapper, true);
            }
        }
        wrapper.push_str("</div>");
        return wrapper;
    }

    if only_main_content {
        for selector in MAIN_CONTENT_SELECTORS {
            let Ok(parsed) = Selector::parse(selector) else { continue };
            if let Some(el) = root.select(&parsed).next() {
                let mut out = String::new();
                serialize_excluding(&el, &to_remove, &mut out, true);
                return out;
            }
        }
    }

    let body_selector = Selector::parse("body").expect("'body' is a valid selector");
    let mut out = String::new();
    match root.select(&body_selector).next() {
        Some(body) => serialize_excluding(&body, &to_remove, &mut out, false),
        None => serialize_excluding(&root, &to_remove, &mut out, false),
    }
    out
}

fn collect_matches(root: &ElementRef, selectors: &[&str], out: &mut HashSet<ego_tree::NodeId>) {
    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str) else { continue };
        for el in root.select(&selector) {
            out.insert(el.id());
        }
    }
}

/// Serialize `element`'s children (and, when `include_self`, the element's
/// own tag) while skipping anything in `to_remove`.
fn serialize_excluding(
    element: &ElementRef,
    to_remove: &HashSet<ego_tree::NodeId>,
    output: &mut String,
    include_self: bool,
) {
    if include_self {
        write_open_tag(element, output);
    }
    for child in element.children() {
        match child.value() {
            ScraperNode::Text(text) => escape_text(text, output),
            ScraperNode::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if to_remove.contains(&child_el.id()) {
                        continue;
                    }
                    write_open_tag(&child_el, output);
                    if !is_void_element(child_el.value().name()) {
                        serialize_excluding(&child_el, to_remove, output, false);
                        output.push_str("</");
                        output.push_str(child_el.value().name());
                        output.push('>');
                    }
                }
            }
            ScraperNode::Comment(comment) => {
                output.push_str("<!--");
                output.push_str(comment);
                output.push_str("-->");
            }
            _ => {}
        }
    }
    if include_self && !is_void_element(element.value().name()) {
        output.push_str("</");
        output.push_str(element.value().name());
        output.push('>');
    }
}

fn write_open_tag(element: &ElementRef, output: &mut String) {
    output.push('<');
    output.push_str(element.value().name());
    for (name, value) in element.value().attrs() {
        output.push(' ');
        output.push_str(name);
        output.push_str("=\"");
        escape_attr(value, output);
        output.push('"');
    }
    output.push('>');
}

fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "param" | "source" | "track" | "wbr"
    )
}

fn escape_text(text: &str, output: &mut String) {
    for ch in text.chars() {
        match ch {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            c => output.push(c),
        }
    }
}

fn escape_attr(value: &str, output: &mut String) {
    for ch in value.chars() {
        match ch {
            '"' => output.push_str("&quot;"),
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            c => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_always_remove_tags() {
        let html = "<html><body><script>x()</script><p>Hello</p><footer>f</footer></body></html>";
        let cleaned = clean(html, false, &[], &[]);
        assert!(!cleaned.contains("<script>"));
        assert!(!cleaned.contains("<footer>"));
        assert!(cleaned.contains("Hello"));
    }

    #[test]
    fn exclude_tags_removes_matched_subtree() {
        let html = "<html><body><div class=\"ad\">buy now</div><p>content</p></body></html>";
        let cleaned = clean(html, false, &[], &[".ad".to_string()]);
        assert!(!cleaned.contains("buy now"));
        assert!(cleaned.contains("content"));
    }

    #[test]
    fn include_tags_takes_precedence_over_only_main_content() {
        let html = "<html><body><main>main content</main><aside id=\"widget\">widget</aside></body></html>";
        let cleaned = clean(html, true, &["#widget".to_string()], &[]);
        assert!(cleaned.contains("widget"));
        assert!(!cleaned.contains("main content"));
    }

    #[test]
    fn only_main_content_picks_first_matching_selector() {
        let html = "<html><body><article>article body</article><p>other</p></body></html>";
        let cleaned = clean(html, true, &[], &[]);
        assert!(cleaned.contains("article body"));
        assert!(!cleaned.contains("other"));
    }

    #[test]
    fn falls_back_to_body_when_nothing_else_applies() {
        let html = "<html><body><p>plain</p></body></html>";
        let cleaned = clean(html, false, &[], &[]);
        assert!(cleaned.contains("plain"));
    }

    #[test]
    fn invalid_selector_is_skipped_not_fatal() {
        let html = "<html><body><p>ok</p></body></html>";
        let cleaned = clean(html, false, &[], &[":::not-a-selector".to_string()]);
        assert!(cleaned.contains("ok"));
    }
}
