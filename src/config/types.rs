//! `CoreConfig`: environment-driven configuration for the map/scrape/crawl
//! operations and the opaque collaborators they wire in (LLM client,
//! CAPTCHA solver). A flat struct with a `Default` impl and plain accessor
//! methods.

use std::path::PathBuf;
use std::time::Duration;

use crate::page_fetch::WaitUntil;

/// Environment-driven configuration consumed by the map/scrape/crawl
/// operations.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub(crate) output_dir: PathBuf,
    pub(crate) cache_dir: PathBuf,
    pub(crate) headless: bool,
    pub(crate) global_timeout: Duration,
    pub(crate) user_agent: Option<String>,
    pub(crate) locale: Option<String>,
    pub(crate) timezone: Option<String>,
    pub(crate) proxy: Option<String>,
    pub(crate) captcha_api_key: Option<String>,
    pub(crate) captcha_timeout: Duration,
    pub(crate) llm_provider: Option<String>,
    pub(crate) llm_model: Option<String>,
    pub(crate) llm_base_url: Option<String>,
    pub(crate) llm_api_key: Option<String>,
    pub(crate) default_wait_until: WaitUntil,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            cache_dir: crate::cache::default_cache_dir(),
            headless: true,
            global_timeout: Duration::from_secs(30),
            user_agent: None,
            locale: None,
            timezone: None,
            proxy: None,
            captcha_api_key: None,
            captcha_timeout: Duration::from_secs(120),
            llm_provider: None,
            llm_model: None,
            llm_base_url: None,
            llm_api_key: None,
            default_wait_until: WaitUntil::default(),
        }
    }
}

impl CoreConfig {
    #[must_use]
    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    #[must_use]
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    #[must_use]
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub fn captcha_api_key(&self) -> Option<&str> {
        self.captcha_api_key.as_deref()
    }

    #[must_use]
    pub fn captcha_timeout(&self) -> Duration {
        self.captcha_timeout
    }

    #[must_use]
    pub fn llm_provider(&self) -> Option<&str> {
        self.llm_provider.as_deref()
    }

    #[must_use]
    pub fn llm_model(&self) -> Option<&str> {
        self.llm_model.as_deref()
    }

    #[must_use]
    pub fn llm_base_url(&self) -> Option<&str> {
        self.llm_base_url.as_deref()
    }

    #[must_use]
    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm_api_key.as_deref()
    }

    #[must_use]
    pub fn default_wait_until(&self) -> WaitUntil {
        self.default_wait_until
    }
}
