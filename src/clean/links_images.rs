//! Image extraction. Link extraction proper is a browser-level operation
//! (see `page_fetch::extract_links`) since it needs a live DOM walk; this
//! module covers the pure-HTML image union: `<img src/srcset>`, `<picture>
//! <source>`, and CSS `background-image` declarations.

use std::collections::BTreeSet;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

const TRACKING_SUBSTRINGS: &[&str] = &["1x1", "pixel", "tracking", "analytics"];

/// Union of `<img src>`, `<img srcset>`, `<source src/srcset>`, and CSS
/// `background-image: url(...)` from inline `style` attributes and `<style>`
/// blocks. Absolutised against `base_url`; `data:` URIs and obvious tracking
/// pixels are filtered; the result is deduplicated and sorted.
pub fn extract_images(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let mut found = BTreeSet::new();

    if let Ok(selector) = Selector::parse("img") {
        for el in document.select(&selector) {
            if let Some(src) = el.value().attr("src") {
                push_resolved(&mut found, &base, src);
            }
            if let Some(srcset) = el.value().attr("srcset") {
                for url in parse_srcset(srcset) {
                    push_resolved(&mut found, &base, &url);
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("source") {
        for el in document.select(&selector) {
            if let Some(src) = el.value().attr("src") {
                push_resolved(&mut found, &base, src);
            }
            if let Some(srcset) = el.value().attr("srcset") {
                for url in parse_srcset(srcset) {
                    push_resolved(&mut found, &base, &url);
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("[style]") {
        for el in document.select(&selector) {
            if let Some(style) = el.value().attr("style") {
                for url in extract_css_background_urls(style) {
                    push_resolved(&mut found, &base, &url);
                }
            }
        }
    }
    if let Ok(selector) = Selector::parse("style") {
        for el in document.select(&selector) {
            let css = el.text().collect::<String>();
            for url in extract_css_background_urls(&css) {
                push_resolved(&mut found, &base, &url);
            }
        }
    }

    found.into_iter().collect()
}

fn push_resolved(found: &mut BTreeSet<String>, base: &Url, candidate: &str) {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.starts_with("data:") {
        return;
    }
    let Ok(resolved) = base.join(candidate) else { return };
    let resolved = resolved.to_string();
    if is_tracking_pixel(&resolved) {
        return;
    }
    found.insert(resolved);
}

fn is_tracking_pixel(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    TRACKING_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

fn parse_srcset(srcset: &str) -> Vec<String> {
    srcset
        .split(',')
        .filter_map(|entry| entry.trim().split_whitespace().next())
        .map(|s| s.to_string())
        .collect()
}

fn extract_css_background_urls(css: &str) -> Vec<String> {
    let re = Regex::new(r#"background(?:-image)?\s*:\s*[^;]*url\(\s*['"]?([^'")]+)['"]?\s*\)"#)
        .expect("hardcoded regex is valid");
    re.captures_iter(css)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_img_src_and_srcset() {
        let html = r#"<html><body><img src="/a.png" srcset="/b.png 1x, /c.png 2x"></body></html>"#;
        let images = extract_images(html, "https://x.test/page");
        assert!(images.contains(&"https://x.test/a.png".to_string()));
        assert!(images.contains(&"https://x.test/b.png".to_string()));
        assert!(images.contains(&"https://x.test/c.png".to_string()));
    }

    #[test]
    fn skips_data_uris_and_tracking_pixels() {
        let html = r#"<html><body>
            <img src="data:image/png;base64,aaaa">
            <img src="/pixel-tracker.gif">
        </body></html>"#;
        let images = extract_images(html, "https://x.test/");
        assert!(images.is_empty());
    }

    #[test]
    fn reads_css_background_image_from_style_attribute_and_block() {
        let html = r#"<html><head><style>.hero { background-image: url('/hero.jpg'); }</style></head>
            <body><div style="background: url(/inline.jpg) no-repeat"></div></body></html>"#;
        let images = extract_images(html, "https://x.test/");
        assert!(images.contains(&"https://x.test/hero.jpg".to_string()));
        assert!(images.contains(&"https://x.test/inline.jpg".to_string()));
    }

    #[test]
    fn result_is_deduplicated_and_sorted() {
        let html = r#"<html><body><img src="/a.png"><img src="/a.png"></body></html>"#;
        let images = extract_images(html, "https://x.test/");
        assert_eq!(images, vec!["https://x.test/a.png".to_string()]);
    }
}
