//! Thin CLI front-end dispatching over three verbs (`map`, `scrape`, `crawl`).
//! Just enough to exercise the core from a terminal, not a production CLI
//! surface. No `clap`: plain `std::env::args`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use webcrawl_core::browser_pool::{BrowserPool, BrowserPoolConfig};
use webcrawl_core::config::ConfigBuilder;
use webcrawl_core::crawl::{self, CrawlOptions};
use webcrawl_core::events::{self, CrawlEvent, MapEvent};
use webcrawl_core::map::{self, MapOptions};
use webcrawl_core::scrape::{self, Format, ScrapeOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut args = std::env::args().skip(1);
    let verb = args.next().context("usage: webcrawl <map|scrape|crawl> <url> [output_dir]")?;
    let url = args.next().context("missing <url> argument")?;

    let config = ConfigBuilder::new().env_overrides().build();
    let pool_config = BrowserPoolConfig { headless: config.headless(), ..Default::default() };
    let pool = BrowserPool::new(pool_config);
    pool.start().await.context("failed to start browser pool")?;

    let http = reqwest::Client::new();

    let result = match verb.as_str() {
        "map" => run_map(&http, &pool, &url).await,
        "scrape" => run_scrape(&pool, &url).await,
        "crawl" => {
            let output_dir = args.next().map(std::path::PathBuf::from);
            run_crawl(&http, &pool, &url, output_dir).await
        }
        other => bail!("unknown verb '{other}', expected map|scrape|crawl"),
    };

    pool.shutdown().await.context("failed to shut down browser pool")?;
    result
}

async fn run_map(http: &reqwest::Client, pool: &Arc<BrowserPool>, url: &str) -> Result<()> {
    let options = MapOptions::default();
    let (tx, mut rx) = events::channel::<MapEvent>(events::DEFAULT_CHANNEL_CAPACITY);
    let handle = tokio::spawn({
        let pool = Arc::clone(pool);
        let http = http.clone();
        let url = url.to_string();
        async move { map::map(&http, &pool, &url, &options, &tx).await }
    });
    while let Some(event) = rx.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    handle.await.context("map task panicked")?;
    Ok(())
}

async fn run_scrape(pool: &Arc<BrowserPool>, url: &str) -> Result<()> {
    let mut formats = HashSet::new();
    formats.insert(Format::Markdown);
    let options = ScrapeOptions::default();
    let result = scrape::scrape(pool, None, url, &formats, &options, None, None).await;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

async fn run_crawl(
    http: &reqwest::Client,
    pool: &Arc<BrowserPool>,
    url: &str,
    output_dir: Option<std::path::PathBuf>,
) -> Result<()> {
    let mut options = CrawlOptions::default();
    options.output_dir = output_dir;
    let (tx, mut rx) = events::channel::<CrawlEvent>(events::DEFAULT_CHANNEL_CAPACITY);
    let handle = tokio::spawn({
        let pool = Arc::clone(pool);
        let http = http.clone();
        let url = url.to_string();
        async move { crawl::crawl(&pool, &http, &url, &options, &tx).await }
    });
    while let Some(event) = rx.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    handle.await.context("crawl task panicked")?;
    Ok(())
}
