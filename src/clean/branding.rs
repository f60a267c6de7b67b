//! Branding extraction: colour roles, theme mode, and logo resolution,
//! built against `scraper`/`regex` in the same style as the rest of the
//! HTML cleaner.

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Branding {
    pub colors: std::collections::HashMap<String, String>,
    pub theme_color: Option<String>,
    pub dark_mode: bool,
    pub logo: Option<String>,
}

const ROLE_PATTERNS: &[(&str, &[&str])] = &[
    ("primary", &["primary", "brand", "main"]),
    ("secondary", &["secondary", "accent2"]),
    ("accent", &["accent", "highlight"]),
    ("background", &["background", "bg"]),
    ("text", &["text", "foreground", "fg"]),
];

const LOGO_SELECTORS: &[&str] = &[
    "img.logo",
    "img#logo",
    "[class*=logo] img",
    ".navbar-brand img",
    ".site-logo img",
    "[role=img][aria-label*=logo]",
    "img[alt*=logo]",
];

pub fn extract_branding(html: &str, base_url: &str) -> Branding {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let css = collect_inline_css(&document);

    Branding {
        colors: extract_color_roles(&css),
        theme_color: select_attr(&document, "meta[name=theme-color]", "content"),
        dark_mode: detect_dark_mode(&document, &css),
        logo: resolve_logo(&document, &css, base.as_ref()),
    }
}

fn collect_inline_css(document: &Html) -> String {
    let mut css = String::new();
    if let Ok(selector) = Selector::parse("style") {
        for el in document.select(&selector) {
            css.push_str(&el.text().collect::<String>());
            css.push('\n');
        }
    }
    css
}

/// Match `--variable-name: value;` custom properties and `font-family`
/// declarations against the fixed role name patterns.
fn extract_color_roles(css: &str) -> std::collections::HashMap<String, String> {
    let mut roles = std::collections::HashMap::new();
    let Ok(var_re) = Regex::new(r"--([a-zA-Z0-9_-]+)\s*:\s*([^;]+);") else {
        return roles;
    };
    for capture in var_re.captures_iter(css) {
        let Some(name) = capture.get(1) else { continue };
        let Some(value) = capture.get(2) else { continue };
        let name_lower = name.as_str().to_ascii_lowercase();
        for (role, patterns) in ROLE_PATTERNS {
            if roles.contains_key(*role) {
                continue;
            }
            if patterns.iter().any(|p| name_lower.contains(p)) {
                roles.insert(role.to_string(), value.as_str().trim().to_string());
            }
        }
    }
    roles
}

fn detect_dark_mode(document: &Html, css: &str) -> bool {
    if let Some(scheme) = select_attr(document, "meta[name=color-scheme]", "content") {
        if scheme.to_ascii_lowercase().contains("dark") {
            return true;
        }
    }
    for selector_str in ["html", "body"] {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(el) = document.select(&selector).next() {
                let class = el.value().attr("class").unwrap_or("").to_ascii_lowercase();
                if class.contains("dark") || class.contains("night") {
                    return true;
                }
            }
        }
    }
    css.to_ascii_lowercase().contains("prefers-color-scheme: dark")
}

/// Resolve a site logo via the priority chain: high-confidence `<img>`
/// selectors, site-builder patterns, CSS background-image on logo-ish
/// selectors, a size-validated header image, then `og:image`.
fn resolve_logo(document: &Html, css: &str, base: Option<&Url>) -> Option<String> {
    for selector_str in LOGO_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(el) = document.select(&selector).next() {
                if let Some(src) = el.value().attr("src") {
                    if passes_size_check(el.value().attr("width"), src) {
                        return resolve(base, src);
                    }
                }
            }
        }
    }

    if let Some(href_logo) = site_builder_logo(document) {
        return resolve(base, &href_logo);
    }

    if let Some(css_logo) = css_background_logo(document, css) {
        return resolve(base, &css_logo);
    }

    if let Ok(selector) = Selector::parse("header img") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(src) = el.value().attr("src") {
                if passes_size_check(el.value().attr("width"), src) {
                    return resolve(base, src);
                }
            }
        }
    }

    select_attr(document, "meta[property=\"og:image\"]", "content").and_then(|src| resolve(base, &src))
}

fn passes_size_check(width_attr: Option<&str>, src: &str) -> bool {
    if src.to_ascii_lowercase().ends_with(".svg") {
        return true;
    }
    match width_attr.and_then(|w| w.parse::<u32>().ok()) {
        Some(width) if width > 600 => false,
        _ => true,
    }
}

fn site_builder_logo(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse("a[href=\"/\"] img") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(src) = el.value().attr("src") {
                return Some(src.to_string());
            }
        }
    }
    if let Ok(selector) = Selector::parse("[data-framer-name=Logo]") {
        if let Some(el) = document.select(&selector).next() {
            if let Some(src) = el.value().attr("src") {
                return Some(src.to_string());
            }
        }
    }
    if let Ok(selector) = Selector::parse("header img") {
        if let Some(el) = document.select(&selector).next() {
            if el
                .value()
                .attr("class")
                .is_some_and(|c| c.to_ascii_lowercase().contains("squarespace"))
            {
                if let Some(src) = el.value().attr("src") {
                    return Some(src.to_string());
                }
            }
        }
    }
    None
}

fn css_background_logo(document: &Html, css: &str) -> Option<String> {
    let re = Regex::new(r#"background(?:-image)?\s*:\s*[^;]*url\(\s*['"]?([^'")]+)['"]?\s*\)"#).ok()?;
    if let Ok(selector) = Selector::parse("[class*=logo]") {
        for el in document.select(&selector) {
            if let Some(style) = el.value().attr("style") {
                if let Some(cap) = re.captures(style) {
                    return cap.get(1).map(|m| m.as_str().to_string());
                }
            }
        }
    }
    let _ = css;
    None
}

fn resolve(base: Option<&Url>, src: &str) -> Option<String> {
    match base {
        Some(base) => base.join(src).ok().map(|u| u.to_string()),
        None => Some(src.to_string()),
    }
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_color_roles_from_custom_properties() {
        let html = r#"<html><head><style>:root { --primary-color: #112233; --text-fg: #000; }</style></head></html>"#;
        let branding = extract_branding(html, "https://x.test/");
        assert_eq!(branding.colors.get("primary").map(String::as_str), Some("#112233"));
        assert_eq!(branding.colors.get("text").map(String::as_str), Some("#000"));
    }

    #[test]
    fn detects_dark_mode_from_class() {
        let html = r#"<html class="theme-dark"><body></body></html>"#;
        let branding = extract_branding(html, "https://x.test/");
        assert!(branding.dark_mode);
    }

    #[test]
    fn resolves_logo_from_high_confidence_selector() {
        let html = r#"<html><body><img class="site-logo" src="/logo.png"></body></html>"#;
        let branding = extract_branding(html, "https://x.test/");
        assert_eq!(branding.logo.as_deref(), Some("https://x.test/logo.png"));
    }

    #[test]
    fn falls_back_to_og_image() {
        let html = r#"<html><head><meta property="og:image" content="/social.png"></head></html>"#;
        let branding = extract_branding(html, "https://x.test/");
        assert_eq!(branding.logo.as_deref(), Some("https://x.test/social.png"));
    }
}
