//! Environment-driven configuration: a flat struct plus a fluent builder,
//! scoped to the values the map/scrape/crawl operations actually consume.

pub mod builder;
pub mod types;

pub use builder::ConfigBuilder;
pub use types::CoreConfig;
