//! Robots policy: fetch, parse, and evaluate robots.txt.
//!
//! Line-oriented parsing with `#` comments, case-insensitive directives,
//! groups delimited by `User-agent:`, exact-match-beats-wildcard group
//! selection, and `$`/`*` pattern semantics translated to regex.

use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tracing::warn;
use url::Url;

#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("invalid origin URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Parsed robots.txt rules for a single origin. Network and parse failures
/// never surface as errors to callers — `fetch` always returns a usable
/// (possibly permissive) policy.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    pub user_agent: String,
    pub crawl_delay: Option<f64>,
    pub request_rate: Option<f64>,
    pub sitemaps: Vec<String>,
    pub allow_patterns: Vec<String>,
    pub disallow_patterns: Vec<String>,
}

/// Fetch `<origin>/robots.txt` (following redirects, 30s timeout). 404 and
/// 5xx responses are silently permissive; other non-200 statuses are
/// permissive with a warning; network errors are permissive with a warning.
pub async fn fetch(client: &Client, origin: &str, user_agent: &str) -> Result<RobotsPolicy, RobotsError> {
    let base = Url::parse(origin)?;
    let robots_url = base.join("/robots.txt")?;

    let response = match client
        .get(robots_url.clone())
        .timeout(Duration::from_secs(30))
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!("failed to fetch robots.txt from {}: {}", robots_url, e);
            return Ok(RobotsPolicy {
                user_agent: user_agent.to_string(),
                ..Default::default()
            });
        }
    };

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(RobotsPolicy {
            user_agent: user_agent.to_string(),
            ..Default::default()
        });
    }
    if status.is_server_error() {
        warn!("robots.txt returned {} at {}, assuming permissive", status, robots_url);
        return Ok(RobotsPolicy {
            user_agent: user_agent.to_string(),
            ..Default::default()
        });
    }
    if !status.is_success() {
        warn!("robots.txt returned unexpected status {} at {}", status, robots_url);
        return Ok(RobotsPolicy {
            user_agent: user_agent.to_string(),
            ..Default::default()
        });
    }

    let text = match response.text().await {
        Ok(t) => t,
        Err(e) => {
            warn!("failed to read robots.txt body from {}: {}", robots_url, e);
            return Ok(RobotsPolicy {
                user_agent: user_agent.to_string(),
                ..Default::default()
            });
        }
    };

    Ok(parse(&text, user_agent))
}

/// Parse robots.txt content for the given user agent.
pub fn parse(content: &str, user_agent: &str) -> RobotsPolicy {
    let mut policy = RobotsPolicy {
        user_agent: user_agent.to_string(),
        ..Default::default()
    };
    let target = user_agent.to_ascii_lowercase();

    let mut current_ua: Option<String> = None;
    let mut ua_matched = false;

    for raw_line in content.lines() {
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before.trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                let ua = value.to_ascii_lowercase();
                if ua == target {
                    ua_matched = true;
                }
                current_ua = Some(ua);
            }
            "sitemap" => {
                if !value.is_empty() && !policy.sitemaps.iter().any(|s| s == value) {
                    policy.sitemaps.push(value.to_string());
                }
            }
            _ => {
                let Some(ua) = current_ua.as_deref() else {
                    continue;
                };
                let is_matching = ua == target || (ua == "*" && !ua_matched);
                if !is_matching {
                    continue;
                }
                match directive.as_str() {
                    "disallow" if !value.is_empty() => policy.disallow_patterns.push(value.to_string()),
                    "allow" if !value.is_empty() => policy.allow_patterns.push(value.to_string()),
                    "crawl-delay" => {
                        if let Ok(v) = value.parse::<f64>() {
                            policy.crawl_delay = Some(v);
                        }
                    }
                    "request-rate" => {
                        if let Some((reqs, secs)) = value.split_once('/') {
                            if let (Ok(r), Ok(s)) = (reqs.parse::<f64>(), secs.parse::<f64>()) {
                                if s != 0.0 {
                                    policy.request_rate = Some(r / s);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    policy
}

/// Evaluate whether `url` is allowed under `policy`. Allow patterns are
/// checked first (any match ⇒ allowed); then disallow patterns (any match
/// ⇒ denied); default allowed.
pub fn allowed(url: &str, policy: &RobotsPolicy) -> bool {
    let path = Url::parse(url)
        .map(|u| {
            let p = u.path().to_string();
            if p.is_empty() { "/".to_string() } else { p }
        })
        .unwrap_or_else(|_| "/".to_string());

    if policy.allow_patterns.iter().any(|p| matches_pattern(&path, p)) {
        return true;
    }
    if policy.disallow_patterns.iter().any(|p| matches_pattern(&path, p)) {
        return false;
    }
    true
}

/// Translate a robots.txt pattern (`*` wildcard, `$` end-anchor, otherwise
/// literal prefix match) into a regex match against `path`.
fn matches_pattern(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    let has_end_anchor = pattern.ends_with('$');
    let body = if has_end_anchor { &pattern[..pattern.len() - 1] } else { pattern };

    if body.contains('*') {
        let mut regex_pattern = String::from("^");
        for part in body.split('*') {
            regex_pattern.push_str(&regex::escape(part));
            regex_pattern.push_str(".*");
        }
        // trailing ".*" added one time too many; trim it off
        regex_pattern.truncate(regex_pattern.len() - 2);
        if has_end_anchor {
            regex_pattern.push('$');
        }
        return Regex::new(&regex_pattern).map(|re| re.is_match(path)).unwrap_or(false);
    }

    if has_end_anchor {
        path == body
    } else {
        path.starts_with(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
User-agent: *\n\
Disallow: /private\n\
Allow: /private/public\n\
Crawl-delay: 2\n\
Sitemap: https://example.com/sitemap.xml\n\
\n\
User-agent: SpecificBot\n\
Disallow: /\n";

    #[test]
    fn wildcard_group_applies_when_no_exact_match() {
        let policy = parse(SAMPLE, "MyBot");
        assert!(allowed("https://example.com/other", &policy));
        assert!(!allowed("https://example.com/private", &policy));
        assert!(allowed("https://example.com/private/public", &policy));
        assert_eq!(policy.crawl_delay, Some(2.0));
        assert_eq!(policy.sitemaps, vec!["https://example.com/sitemap.xml"]);
    }

    #[test]
    fn exact_match_group_overrides_wildcard() {
        let policy = parse(SAMPLE, "SpecificBot");
        assert!(!allowed("https://example.com/anything", &policy));
    }

    #[test]
    fn absent_patterns_default_to_allowed() {
        let policy = RobotsPolicy::default();
        assert!(allowed("https://example.com/x", &policy));
    }

    #[test]
    fn wildcard_and_end_anchor_patterns() {
        let mut policy = RobotsPolicy::default();
        policy.disallow_patterns.push("/*.pdf$".to_string());
        assert!(!allowed("https://example.com/a.pdf", &policy));
        assert!(allowed("https://example.com/a.pdf.html", &policy));
    }
}
