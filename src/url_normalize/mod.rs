//! URL normaliser: fragment stripping, tracking-parameter removal, a
//! dedupe key with sorted query parameters, and a trailing-slash rule, all
//! as pure, dependency-free transforms over `url::Url`.

use sha2::{Digest, Sha256};
use url::Url;

/// Tracking query parameters stripped during normalisation, beyond the
/// `utm_*` prefix which is matched separately.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "igshid", "mc_cid", "mc_eid", "ref", "ref_src",
    "source", "share", "_ga", "_gl",
];

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

/// Strip the fragment, drop tracking parameters, and apply the trailing-
/// slash rule (keep root `/`, strip elsewhere). Remaining query parameters
/// keep their original order. Idempotent: `normalise(normalise(x)) == normalise(x)`.
pub fn normalise(url: &str) -> Result<String, url::ParseError> {
    let mut parsed = Url::parse(url)?;
    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    set_query_pairs(&mut parsed, &kept);

    apply_trailing_slash_rule(&mut parsed);

    Ok(parsed.to_string())
}

/// As `normalise`, but for dedupe comparison: remaining query parameters are
/// additionally sorted lexicographically by (key, value). Two URLs that
/// differ only in tracking params or query-parameter order produce the same
/// dedupe key.
pub fn dedupe_key(url: &str) -> Result<String, url::ParseError> {
    let mut parsed = Url::parse(url)?;
    parsed.set_fragment(None);

    let mut kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort();
    set_query_pairs(&mut parsed, &kept);

    apply_trailing_slash_rule(&mut parsed);

    Ok(parsed.to_string())
}

/// `SHA-256(normalise(url) [ "|" variant ])`, truncated to 16 hex chars.
/// Same (url, variant) always produces the same key; different variant (or
/// URL) produces a different key.
pub fn cache_key(url: &str, variant: Option<&str>) -> Result<String, url::ParseError> {
    let normalised = normalise(url)?;
    let basis = match variant {
        Some(v) if !v.is_empty() => format!("{normalised}|{v}"),
        _ => normalised,
    };
    let mut hasher = Sha256::new();
    hasher.update(basis.as_bytes());
    let digest = hasher.finalize();
    Ok(hex::encode(digest)[..16].to_string())
}

/// Canonical-link-aware normalisation: when HTML is supplied, prefer a
/// `<link rel="canonical">` href (resolved
/// against `entrypoint`, falling back to `url`) before running the ordinary
/// normalisation. Used by the map engine's link-extraction step; the plain
/// `normalise` above remains the primary, HTML-less contract.
pub fn normalise_with_html(url: &str, html: Option<&str>, entrypoint: Option<&str>) -> Result<String, url::ParseError> {
    let candidate = match html.and_then(|h| extract_canonical_href(h)) {
        Some(href) => {
            let base = Url::parse(entrypoint.unwrap_or(url))?;
            match base.join(&href) {
                Ok(joined) => joined.to_string(),
                Err(_) => url.to_string(),
            }
        }
        None => url.to_string(),
    };
    normalise(&candidate)
}

fn extract_canonical_href(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("link[rel=canonical]").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(|s| s.to_string())
}

fn set_query_pairs(parsed: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
        parsed.set_query(Some(&serializer.finish()));
    }
}

fn apply_trailing_slash_rule(parsed: &mut Url) {
    let path = parsed.path();
    if path != "/" && path.ends_with('/') {
        let stripped = path.trim_end_matches('/').to_string();
        let stripped = if stripped.is_empty() { "/".to_string() } else { stripped };
        parsed.set_path(&stripped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalise_is_idempotent() {
        let url = "https://example.com/path/?utm_source=x&id=7#frag";
        let once = normalise(url).unwrap();
        let twice = normalise(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn normalise_keeps_root_slash() {
        assert_eq!(normalise("https://example.com/").unwrap(), "https://example.com/");
    }

    #[test]
    fn normalise_strips_trailing_slash_on_non_root_path() {
        assert_eq!(normalise("https://example.com/foo/").unwrap(), "https://example.com/foo");
    }

    #[test]
    fn dedupe_key_ignores_tracking_params_and_order() {
        let a = dedupe_key("https://a.test/b?utm_source=x&id=7").unwrap();
        let b = dedupe_key("https://a.test/b?id=7").unwrap();
        let c = dedupe_key("https://a.test/b?id=7&utm_medium=q").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn dedupe_key_sorts_remaining_params() {
        let a = dedupe_key("https://a.test/b?z=1&a=2").unwrap();
        let b = dedupe_key("https://a.test/b?a=2&z=1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_differs_by_variant() {
        let k1 = cache_key("https://a.test/", Some("screenshot:true")).unwrap();
        let k2 = cache_key("https://a.test/", Some("screenshot:false")).unwrap();
        assert_ne!(k1, k2);
        assert_eq!(k1.len(), 16);
    }

    #[test]
    fn cache_key_same_url_and_variant_matches() {
        let k1 = cache_key("https://a.test/x", Some("v")).unwrap();
        let k2 = cache_key("https://a.test/x", Some("v")).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn normalise_with_html_prefers_canonical() {
        let html = r#"<html><head><link rel="canonical" href="https://a.test/canonical"></head></html>"#;
        let out = normalise_with_html("https://a.test/page?utm_source=x", Some(html), None).unwrap();
        assert_eq!(out, "https://a.test/canonical");
    }
}
