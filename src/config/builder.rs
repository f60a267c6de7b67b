//! Fluent builder for [`CoreConfig`]. Every field has an
//! environment-derived default, so there is no "required field" ordering
//! to enforce at compile time.

use std::path::PathBuf;
use std::time::Duration;

use crate::page_fetch::WaitUntil;

use super::types::CoreConfig;

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: CoreConfig,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output_dir = dir;
        self
    }

    #[must_use]
    pub fn cache_dir(mut self, dir: PathBuf) -> Self {
        self.config.cache_dir = dir;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn global_timeout(mut self, timeout: Duration) -> Self {
        self.config.global_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.config.user_agent = Some(value.into());
        self
    }

    #[must_use]
    pub fn proxy(mut self, value: impl Into<String>) -> Self {
        self.config.proxy = Some(value.into());
        self
    }

    #[must_use]
    pub fn default_wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.config.default_wait_until = wait_until;
        self
    }

    /// Overlay values read from the process environment on top of whatever
    /// has been set so far. Unset or unparsable variables leave the current
    /// value untouched.
    #[must_use]
    pub fn env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("WEBCRAWL_OUTPUT_DIR") {
            self.config.output_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_CACHE_DIR") {
            self.config.cache_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_HEADLESS") {
            if let Ok(parsed) = value.parse::<bool>() {
                self.config.headless = parsed;
            }
        }
        if let Ok(value) = std::env::var("WEBCRAWL_GLOBAL_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse::<u64>() {
                self.config.global_timeout = Duration::from_secs(parsed);
            }
        }
        if let Ok(value) = std::env::var("WEBCRAWL_USER_AGENT") {
            self.config.user_agent = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_LOCALE") {
            self.config.locale = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_TIMEZONE") {
            self.config.timezone = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_PROXY") {
            self.config.proxy = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_CAPTCHA_API_KEY") {
            self.config.captcha_api_key = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_CAPTCHA_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse::<u64>() {
                self.config.captcha_timeout = Duration::from_secs(parsed);
            }
        }
        if let Ok(value) = std::env::var("WEBCRAWL_LLM_PROVIDER") {
            self.config.llm_provider = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_LLM_MODEL") {
            self.config.llm_model = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_LLM_BASE_URL") {
            self.config.llm_base_url = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_LLM_API_KEY") {
            self.config.llm_api_key = Some(value);
        }
        if let Ok(value) = std::env::var("WEBCRAWL_DEFAULT_WAIT_UNTIL") {
            if let Some(wait_until) = parse_wait_until(&value) {
                self.config.default_wait_until = wait_until;
            }
        }
        self
    }

    #[must_use]
    pub fn build(self) -> CoreConfig {
        self.config
    }
}

fn parse_wait_until(value: &str) -> Option<WaitUntil> {
    match value.to_ascii_lowercase().as_str() {
        "commit" => Some(WaitUntil::Commit),
        "domcontentloaded" | "dom_content_loaded" => Some(WaitUntil::DomContentLoaded),
        "load" => Some(WaitUntil::Load),
        "networkidle" | "network_idle" => Some(WaitUntil::NetworkIdle),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_set_fields() {
        let config = ConfigBuilder::new().headless(false).build();
        assert!(!config.headless());
        assert_eq!(config.output_dir(), &PathBuf::from("./output"));
    }

    #[test]
    fn parse_wait_until_accepts_known_values_case_insensitively() {
        assert_eq!(parse_wait_until("Load"), Some(WaitUntil::Load));
        assert_eq!(parse_wait_until("network_idle"), Some(WaitUntil::NetworkIdle));
        assert_eq!(parse_wait_until("bogus"), None);
    }
}
