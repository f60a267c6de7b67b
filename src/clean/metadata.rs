//! Page metadata extraction: title, description, Open Graph/Twitter card
//! tags, and canonical URL, each with a fallback chain when the primary
//! source is missing.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub canonical_url: Option<String>,
    pub og: std::collections::HashMap<String, String>,
    pub timezone: Option<String>,
    /// Set by the scrape service, not by this extractor, when a cache entry
    /// was returned instead of a live fetch.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub cache_hit: bool,
}

/// Extract `PageMetadata` from an HTML document. Title/description use the
/// fallback chain `<title>` → `og:title` → `twitter:title` (and the `og:`/
/// `twitter:` equivalents for description), stopping at the first non-empty
/// value.
pub fn extract_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    let og = extract_open_graph(&document);

    PageMetadata {
        title: first_non_empty([
            select_text(&document, "title"),
            og.get("og:title").cloned(),
            select_attr(&document, "meta[name=twitter:title]", "content"),
        ]),
        description: first_non_empty([
            select_attr(&document, "meta[name=description]", "content"),
            og.get("og:description").cloned(),
            select_attr(&document, "meta[name=twitter:description]", "content"),
        ]),
        language: select_attr(&document, "html", "lang"),
        canonical_url: select_attr(&document, "link[rel=canonical]", "href"),
        timezone: extract_timezone(&document),
        og,
        cache_hit: false,
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.to_string())
}

fn extract_open_graph(document: &Html) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    let Ok(selector) = Selector::parse("meta[property^=\"og:\"]") else {
        return map;
    };
    for el in document.select(&selector) {
        let (Some(property), Some(content)) = (el.value().attr("property"), el.value().attr("content")) else {
            continue;
        };
        map.insert(property.to_string(), content.to_string());
    }
    map
}

/// IANA timezone, read from JSON-LD `@graph`/top-level `timeZone`-ish keys or
/// a `meta[name=timezone]` tag. JSON-LD parsing is best-effort: malformed
/// script bodies are skipped rather than treated as an error.
fn extract_timezone(document: &Html) -> Option<String> {
    if let Some(tz) = select_attr(document, "meta[name=timezone]", "content") {
        return Some(tz);
    }
    let selector = Selector::parse("script[type=\"application/ld+json\"]").ok()?;
    for el in document.select(&selector) {
        let text = el.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
        if let Some(tz) = find_timezone_key(&value) {
            return Some(tz);
        }
    }
    None
}

fn find_timezone_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            for key in ["timeZone", "timezone", "dateTimeZone"] {
                if let Some(s) = map.get(key).and_then(|v| v.as_str()) {
                    return Some(s.to_string());
                }
            }
            map.values().find_map(find_timezone_key)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_timezone_key),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_falls_back_through_chain() {
        let html = r#"<html><head><meta property="og:title" content="OG Title"></head><body></body></html>"#;
        let metadata = extract_metadata(html);
        assert_eq!(metadata.title.as_deref(), Some("OG Title"));
    }

    #[test]
    fn title_tag_wins_when_present() {
        let html = r#"<html><head><title>Real Title</title><meta property="og:title" content="OG Title"></head></html>"#;
        let metadata = extract_metadata(html);
        assert_eq!(metadata.title.as_deref(), Some("Real Title"));
    }

    #[test]
    fn canonical_and_language_are_read() {
        let html = r#"<html lang="en-US"><head><link rel="canonical" href="https://a.test/c"></head></html>"#;
        let metadata = extract_metadata(html);
        assert_eq!(metadata.language.as_deref(), Some("en-US"));
        assert_eq!(metadata.canonical_url.as_deref(), Some("https://a.test/c"));
    }
}
