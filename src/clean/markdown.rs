//! Markdown conversion (`to_markdown`), delegated to the `htmd` crate.
//! `javascript:` anchors are stripped in a pre-pass using the same
//! selector-removal serializer as [`super::clean`], since those elements
//! (including their text) need to be dropped entirely rather than just their
//! `href`.

use std::collections::HashSet;

use htmd::{Element, HtmlToMarkdown};
use scraper::{ElementRef, Html, Selector};

/// Policy knobs that change markdown output, beyond what's baked into the
/// converter (ATX headings, `-` bullets, preserved tables/code blocks are
/// non-negotiable per spec and not exposed here).
#[derive(Debug, Clone, Default)]
pub struct MarkdownPolicy {
    pub base_url: Option<String>,
}

pub fn to_markdown(html: &str, policy: &MarkdownPolicy) -> String {
    let without_js_links = strip_javascript_anchors(html);

    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style"])
        .add_handler(vec!["a"], drop_javascript_links)
        .build();

    let raw = converter
        .convert(&without_js_links)
        .unwrap_or_else(|_| without_js_links.clone());

    let absolutised = match &policy.base_url {
        Some(base) => absolutise_relative_links(&raw, base),
        None => raw,
    };

    postprocess(&absolutised)
}

/// Second line of defence: even though `strip_javascript_anchors` already
/// removes these elements at the HTML level, a handler is kept here too in
/// case nested/malformed markup slips an anchor through unparsed.
fn drop_javascript_links(element: Element) -> Option<String> {
    let is_js = element
        .attrs
        .iter()
        .any(|(name, value)| name.eq_ignore_ascii_case("href") && value.trim().to_ascii_lowercase().starts_with("javascript:"));
    if is_js {
        Some(String::new())
    } else {
        None
    }
}

fn strip_javascript_anchors(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let Ok(selector) = Selector::parse("a[href]") else {
        return html.to_string();
    };

    let mut to_remove: HashSet<ego_tree::NodeId> = HashSet::new();
    for el in root.select(&selector) {
        if let Some(href) = el.value().attr("href") {
            if href.trim().to_ascii_lowercase().starts_with("javascript:") {
                to_remove.insert(el.id());
            }
        }
    }
    if to_remove.is_empty() {
        return html.to_string();
    }

    let mut out = String::new();
    serialize_excluding(&root, &to_remove, &mut out);
    out
}

fn serialize_excluding(element: &ElementRef, to_remove: &HashSet<ego_tree::NodeId>, output: &mut String) {
    for child in element.children() {
        match child.value() {
            scraper::node::Node::Text(text) => output.push_str(text),
            scraper::node::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if to_remove.contains(&child_el.id()) {
                        continue;
                    }
                    output.push('<');
                    output.push_str(child_el.value().name());
                    for (name, value) in child_el.value().attrs() {
                        output.push(' ');
                        output.push_str(name);
                        output.push_str("=\"");
                        output.push_str(value);
                        output.push('"');
                    }
                    output.push('>');
                    serialize_excluding(&child_el, to_remove, output);
                    output.push_str("</");
                    output.push_str(child_el.value().name());
                    output.push('>');
                }
            }
            _ => {}
        }
    }
}

fn absolutise_relative_links(markdown: &str, base_url: &str) -> String {
    let Ok(base) = url::Url::parse(base_url) else {
        return markdown.to_string();
    };
    let re = regex::Regex::new(r"\]\(([^)]+)\)").expect("hardcoded regex is valid");
    re.replace_all(markdown, |caps: &regex::Captures| {
        let href = &caps[1];
        if href.starts_with("http://") || href.starts_with("https://") || href.starts_with('#') {
            format!("]({href})")
        } else {
            match base.join(href) {
                Ok(resolved) => format!("]({resolved})"),
                Err(_) => format!("]({href})"),
            }
        }
    })
    .to_string()
}

/// Collapse runs of more than two blank lines and strip trailing whitespace
/// per line.
fn postprocess(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0;
    for line in markdown.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }
    out.trim_end_matches('\n').to_string() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn javascript_links_are_dropped_entirely() {
        let html = r#"<p>before <a href="javascript:alert(1)">click me</a> after</p>"#;
        let markdown = to_markdown(html, &MarkdownPolicy::default());
        assert!(!markdown.contains("click me"));
        assert!(markdown.contains("before"));
        assert!(markdown.contains("after"));
    }

    #[test]
    fn ordinary_links_are_preserved() {
        let html = r#"<p><a href="https://a.test/">a link</a></p>"#;
        let markdown = to_markdown(html, &MarkdownPolicy::default());
        assert!(markdown.contains("a link"));
        assert!(markdown.contains("https://a.test/"));
    }

    #[test]
    fn collapses_excess_blank_lines() {
        let input = "one\n\n\n\n\ntwo\n";
        let collapsed = postprocess(input);
        assert!(!collapsed.contains("\n\n\n\n"));
        assert!(collapsed.contains("one"));
        assert!(collapsed.contains("two"));
    }

    #[test]
    fn relative_links_are_absolutised() {
        let markdown = "[home](/index.html)";
        let out = absolutise_relative_links(markdown, "https://a.test/blog/post");
        assert!(out.contains("https://a.test/index.html"));
    }
}
