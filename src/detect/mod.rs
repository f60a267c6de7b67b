//! Bot-block and CAPTCHA detection over page HTML/text: a set of
//! blocking-page and per-provider CAPTCHA regexes, compiled once via
//! `once_cell`/`lazy_static` the way the rest of this codebase caches its
//! hot regexes.

use once_cell::sync::Lazy;
use regex::Regex;

const MIN_WORD_COUNT_FOR_BLOCK: usize = 50;
const MAX_BODY_LEN_FOR_PATTERN_MATCH: usize = 500;

static BLOCK_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)captcha|challenge|cloudflare|access[ _-]?denied|blocked|verify[ _-]?you[ _-]?are[ _-]?human|please[ _-]?wait|checking[ _-]?your[ _-]?browser|just[ _-]?a[ _-]?moment|ray[ _-]?id")
        .expect("hardcoded regex is valid")
});

static CAPTCHA_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)g-recaptcha|grecaptcha|recaptcha/api|h-captcha|hcaptcha\.com|cf-turnstile|challenges\.cloudflare\.com/turnstile|iframe[^>]*captcha|data-sitekey")
        .expect("hardcoded regex is valid")
});

/// Type-specific sitekey regexes so the solve-and-reinject flow knows
/// which response field to populate.
static RECAPTCHA_SITEKEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:class="g-recaptcha"[^>]*data-sitekey="([^"]+)"|data-sitekey="([^"]+)"[^>]*class="g-recaptcha")"#).expect("hardcoded regex is valid"));
static HCAPTCHA_SITEKEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"h-captcha[^>]*data-sitekey="([^"]+)""#).expect("hardcoded regex is valid"));
static TURNSTILE_SITEKEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"cf-turnstile[^>]*data-sitekey="([^"]+)""#).expect("hardcoded regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaType {
    Recaptcha,
    Hcaptcha,
    Turnstile,
}

impl CaptchaType {
    /// The hidden form field the solved token must be injected into.
    pub fn response_field(self) -> &'static str {
        match self {
            CaptchaType::Recaptcha => "g-recaptcha-response",
            CaptchaType::Hcaptcha => "h-captcha-response",
            CaptchaType::Turnstile => "cf-turnstile-response",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptchaMatch {
    pub captcha_type: CaptchaType,
    pub sitekey: Option<String>,
}

/// `looks_like_bot_block(status, html, markdown) → bool`.
pub fn looks_like_bot_block(status: u16, html: &str, markdown: &str) -> bool {
    if matches!(status, 403 | 429 | 503) {
        return true;
    }
    if html.len() < MAX_BODY_LEN_FOR_PATTERN_MATCH && BLOCK_PATTERNS.is_match(html) {
        return true;
    }
    if BLOCK_PATTERNS.is_match(html) && word_count(markdown) < MIN_WORD_COUNT_FOR_BLOCK {
        return true;
    }
    false
}

pub fn looks_like_captcha(html: &str) -> bool {
    CAPTCHA_PATTERNS.is_match(html)
}

/// Identify the captcha type and extract its sitekey, if present. Returns
/// `None` when `looks_like_captcha` would also be `false`.
pub fn identify_captcha(html: &str) -> Option<CaptchaMatch> {
    if let Some(caps) = RECAPTCHA_SITEKEY.captures(html) {
        let sitekey = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string());
        return Some(CaptchaMatch { captcha_type: CaptchaType::Recaptcha, sitekey });
    }
    if let Some(caps) = HCAPTCHA_SITEKEY.captures(html) {
        return Some(CaptchaMatch {
            captcha_type: CaptchaType::Hcaptcha,
            sitekey: caps.get(1).map(|m| m.as_str().to_string()),
        });
    }
    if let Some(caps) = TURNSTILE_SITEKEY.captures(html) {
        return Some(CaptchaMatch {
            captcha_type: CaptchaType::Turnstile,
            sitekey: caps.get(1).map(|m| m.as_str().to_string()),
        });
    }
    if looks_like_captcha(html) {
        return Some(CaptchaMatch { captcha_type: CaptchaType::Recaptcha, sitekey: None });
    }
    None
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The bot/CAPTCHA retry policy as a three-state FSM: a scrape starts
/// `Normal`, escalates to `StealthRetry` exactly once if bot-blocked and an
/// enhanced driver is available, and ends in `Final` either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Normal,
    StealthRetry,
    Final,
}

impl RetryState {
    pub fn next(self, bot_blocked: bool, enhanced_driver_available: bool) -> RetryState {
        match self {
            RetryState::Normal if bot_blocked && enhanced_driver_available => RetryState::StealthRetry,
            RetryState::Normal => RetryState::Final,
            RetryState::StealthRetry => RetryState::Final,
            RetryState::Final => RetryState::Final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_based_block_is_always_detected() {
        assert!(looks_like_bot_block(403, "anything", "anything"));
        assert!(looks_like_bot_block(429, "", ""));
        assert!(looks_like_bot_block(503, "", ""));
    }

    #[test]
    fn small_body_with_pattern_is_blocked() {
        let html = "<html><body>Checking your browser before accessing...</body></html>";
        assert!(looks_like_bot_block(200, html, "a few words only here"));
    }

    #[test]
    fn long_body_matching_pattern_but_substantial_markdown_is_not_blocked() {
        let long_html = format!("<html><body>{}cloudflare{}</body></html>", "x".repeat(600), "y".repeat(10));
        let long_markdown: String = (0..60).map(|_| "word ").collect();
        assert!(!looks_like_bot_block(200, &long_html, &long_markdown));
    }

    #[test]
    fn recaptcha_sitekey_is_extracted() {
        let html = r#"<div class="g-recaptcha" data-sitekey="abc123"></div>"#;
        let found = identify_captcha(html).unwrap();
        assert_eq!(found.captcha_type, CaptchaType::Recaptcha);
        assert_eq!(found.sitekey.as_deref(), Some("abc123"));
        assert_eq!(found.captcha_type.response_field(), "g-recaptcha-response");
    }

    #[test]
    fn retry_fsm_escalates_once_then_stays_final() {
        let s1 = RetryState::Normal.next(true, true);
        assert_eq!(s1, RetryState::StealthRetry);
        let s2 = s1.next(true, true);
        assert_eq!(s2, RetryState::Final);
    }

    #[test]
    fn retry_fsm_skips_escalation_without_enhanced_driver() {
        let s1 = RetryState::Normal.next(true, false);
        assert_eq!(s1, RetryState::Final);
    }
}
