pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod cache;
pub mod clean;
pub mod config;
pub mod crawl;
pub mod detect;
pub mod error;
pub mod events;
pub mod kromekover;
pub mod map;
pub mod page_fetch;
pub mod proxy;
pub mod robots;
pub mod scrape;
pub mod sitemap;
pub mod stealth;
pub mod url_normalize;

pub use browser_pool::{BrowserPool, BrowserPoolConfig, PooledBrowserGuard};
pub use browser_profile::{
    cleanup_stale_lock, cleanup_stale_profiles, create_unique_profile, create_unique_profile_with_prefix,
    is_singleton_lock_stale, BrowserProfile,
};
pub use browser_setup::{apply_stealth_measures, download_managed_browser, find_browser_executable, launch_browser};
pub use cache::{CacheError, CacheStore};
pub use config::{ConfigBuilder, CoreConfig};
pub use crawl::{crawl, CrawlFormat, CrawlOptions};
pub use events::{channel, CrawlEvent, EventSender, MapEvent, DEFAULT_CHANNEL_CAPACITY};
pub use map::{map, MapLink, MapOptions, MapResult, SitemapMode};
pub use scrape::{scrape, CaptchaSolver, ChatMessage, ChatProvider, Format, ScrapeData, ScrapeOptions, ScrapeResult};
