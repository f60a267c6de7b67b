//! Shared error plumbing: correlation ids and the retry-hint helper used
//! across the scrape/crawl error surfaces.

use uuid::Uuid;

/// Generate an 8-hex-character correlation id for a single user-facing
/// request (map/scrape/crawl). Propagated through tracing spans so every
/// log line for a request carries it.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Append a `[HINT: ...]` suggestion to an error string when the failure
/// looks retriable via stealth mode and stealth isn't already active.
///
/// Mirrors the Python original's `_stealth_hint()`: the hint only fires when
/// the failure text suggests blocking (403/429/timeout/blocked/denied), the
/// call wasn't already in stealth mode, and an enhanced driver is available.
pub fn with_stealth_hint(error: String, stealth_active: bool, enhanced_driver_available: bool) -> String {
    let looks_retriable = ["403", "429", "timeout", "blocked", "denied"]
        .iter()
        .any(|needle| error.to_lowercase().contains(needle));

    if !looks_retriable || stealth_active {
        return error;
    }

    if enhanced_driver_available {
        format!("{error} [HINT: retry with stealth=true for enhanced anti-detection]")
    } else {
        format!("{error} [HINT: site may require enhanced stealth mode, which is not configured]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_eight_hex_chars() {
        let id = new_correlation_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hint_added_only_when_retriable_and_not_already_stealth() {
        assert!(with_stealth_hint("HTTP 403 Forbidden".into(), false, true).contains("[HINT"));
        assert!(!with_stealth_hint("HTTP 403 Forbidden".into(), true, true).contains("[HINT"));
        assert!(!with_stealth_hint("parse error".into(), false, true).contains("[HINT"));
    }
}
