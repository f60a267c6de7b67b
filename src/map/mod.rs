//! Map engine: sitemap-first discovery plus a bounded-concurrency BFS
//! crawl of outbound links, followed by post-filtering and a metadata
//! enrichment pass. Phase order is sitemap → BFS → filter → metadata,
//! using the same batched-concurrency idiom as [`crate::sitemap::parse`]
//! (best-effort, never hard-fails the overall operation).

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser_pool::BrowserPool;
use crate::events::{EventSender, MapEvent};
use crate::{clean, page_fetch, robots, sitemap, url_normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapMode {
    Include,
    Skip,
    Only,
}

#[derive(Debug, Clone)]
pub struct MapOptions {
    pub limit: usize,
    pub max_depth: u32,
    pub sitemap_mode: SitemapMode,
    pub include_subdomains: bool,
    pub search: Option<String>,
    pub ignore_query_params: bool,
    pub allow_external_links: bool,
    pub concurrency: usize,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            max_depth: 2,
            sitemap_mode: SitemapMode::Include,
            include_subdomains: false,
            search: None,
            ignore_query_params: false,
            allow_external_links: false,
            concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLink {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapResult {
    pub success: bool,
    pub links: Vec<MapLink>,
    pub error: Option<String>,
}

struct QueueItem {
    url: String,
    depth: u32,
}

/// `map(url, options) → stream of MapEvent`. Events are pushed onto
/// `events` as they occur; the final `Complete`/`Error` event is always the
/// last one sent.
pub async fn map(
    http: &Client,
    browser_pool: &Arc<BrowserPool>,
    seed: &str,
    options: &MapOptions,
    events: &EventSender<MapEvent>,
) {
    let result = run(http, browser_pool, seed, options, events).await;
    match result {
        Ok(links) => {
            events
                .send(MapEvent::Complete { result: MapResult { success: true, links, error: None } })
                .await;
        }
        Err(message) => {
            events.send(MapEvent::Error { message: message.clone() }).await;
            events
                .send(MapEvent::Complete { result: MapResult { success: false, links: Vec::new(), error: Some(message) } })
                .await;
        }
    }
}

async fn run(
    http: &Client,
    browser_pool: &Arc<BrowserPool>,
    seed: &str,
    options: &MapOptions,
    events: &EventSender<MapEvent>,
) -> Result<Vec<MapLink>, String> {
    let seed_normalised = url_normalize::normalise(seed).map_err(|e| format!("invalid seed URL: {e}"))?;
    let seed_url = url::Url::parse(&seed_normalised).map_err(|e| e.to_string())?;
    let seed_host = seed_url.host_str().unwrap_or("").to_string();

    let mut candidates: HashSet<String> = HashSet::new();

    if options.sitemap_mode != SitemapMode::Skip {
        run_sitemap_phase(http, &seed_normalised, &mut candidates, events).await;
    }

    if options.sitemap_mode != SitemapMode::Only {
        run_bfs_phase(http, browser_pool, &seed_normalised, &seed_host, options, &mut candidates, events).await;
    }

    let filtered = post_filter(candidates, options);

    let links = run_metadata_phase(browser_pool, filtered, options, events).await;

    Ok(links)
}

async fn run_sitemap_phase(http: &Client, seed: &str, candidates: &mut HashSet<String>, events: &EventSender<MapEvent>) {
    let Ok(url) = url::Url::parse(seed) else { return };
    let origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));

    let robots_policy = robots::fetch(http, &origin, "*").await.unwrap_or_default();
    let sitemap_urls = sitemap::discover(http, &origin, &robots_policy.sitemaps).await;

    if sitemap_urls.is_empty() {
        events.send(MapEvent::Sitemap { found: 0, message: "no sitemap found".to_string() }).await;
        return;
    }

    events
        .send(MapEvent::Sitemap { found: sitemap_urls.len(), message: format!("found {} sitemap(s)", sitemap_urls.len()) })
        .await;

    for sitemap_url in sitemap_urls {
        let entries = sitemap::parse(http, &sitemap_url, 50_000, 5).await;
        for entry in entries {
            if let Ok(normalised) = url_normalize::normalise(&entry.loc) {
                candidates.insert(normalised);
            }
        }
    }
}

async fn run_bfs_phase(
    http: &Client,
    browser_pool: &Arc<BrowserPool>,
    seed: &str,
    seed_host: &str,
    options: &MapOptions,
    candidates: &mut HashSet<String>,
    events: &EventSender<MapEvent>,
) {
    let _ = http;
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: Vec<QueueItem> = vec![QueueItem { url: seed.to_string(), depth: 0 }];
    let mut discovered = 0usize;

    while !queue.is_empty() && discovered < options.limit {
        let batch: Vec<QueueItem> = queue.drain(..queue.len().min(options.concurrency)).collect();
        let mut next_round: Vec<QueueItem> = Vec::new();

        for item in batch {
            let stripped = strip_fragment(&item.url);
            if visited.contains(&stripped) {
                continue;
            }
            visited.insert(stripped.clone());

            if !host_allowed(&stripped, seed_host, options) {
                continue;
            }

            candidates.insert(stripped.clone());
            discovered += 1;
            events
                .send(MapEvent::Discovery { url: stripped.clone(), discovered, total: options.limit })
                .await;

            if discovered >= options.limit {
                break;
            }

            if item.depth < options.max_depth {
                next_round.push(QueueItem { url: stripped, depth: item.depth + 1 });
            }
        }

        if discovered >= options.limit {
            break;
        }

        let fetched_links = fetch_outbound_links(browser_pool, &next_round, options.concurrency).await;
        for (source, links) in next_round.iter().zip(fetched_links) {
            for link in links {
                let stripped = strip_fragment(&link);
                if !visited.contains(&stripped) {
                    queue.push(QueueItem { url: stripped, depth: source.depth });
                }
            }
        }
    }
}

async fn fetch_outbound_links(browser_pool: &Arc<BrowserPool>, items: &[QueueItem], concurrency: usize) -> Vec<Vec<String>> {
    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(concurrency.max(1)) {
        let futures = chunk.iter().map(|item| async move {
            match browser_pool.acquire().await {
                Ok(guard) => page_fetch::extract_links(&guard, &item.url).await.unwrap_or_default(),
                Err(_) => Vec::new(),
            }
        });
        results.extend(futures::future::join_all(futures).await);
    }
    results
}

fn host_allowed(url: &str, seed_host: &str, options: &MapOptions) -> bool {
    if options.allow_external_links {
        return true;
    }
    let Ok(parsed) = url::Url::parse(url) else { return false };
    let Some(host) = parsed.host_str() else { return false };
    if host == seed_host {
        return true;
    }
    options.include_subdomains && host.ends_with(&format!(".{seed_host}"))
}

fn strip_fragment(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn post_filter(candidates: HashSet<String>, options: &MapOptions) -> Vec<String> {
    let mut result: Vec<String> = if options.ignore_query_params {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for url in candidates {
            let Ok(mut parsed) = url::Url::parse(&url) else { continue };
            parsed.set_query(None);
            parsed.set_fragment(None);
            let key = parsed.to_string();
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    } else {
        candidates.into_iter().collect()
    };

    if let Some(search) = &options.search {
        let needle = search.to_lowercase();
        result.retain(|url| url.to_lowercase().contains(&needle));
    }

    result.truncate(options.limit);
    result
}

async fn run_metadata_phase(
    browser_pool: &Arc<BrowserPool>,
    urls: Vec<String>,
    options: &MapOptions,
    events: &EventSender<MapEvent>,
) -> Vec<MapLink> {
    let batch_size = (2 * options.concurrency).max(20);
    let total = urls.len();
    let mut links = Vec::with_capacity(total);
    let mut completed = 0usize;

    for batch in urls.chunks(batch_size) {
        let futures = batch.iter().map(|url| fetch_one_metadata(browser_pool, url));
        let batch_results = futures::future::join_all(futures).await;
        completed += batch_results.len();
        links.extend(batch_results);
        events.send(MapEvent::Metadata { url: batch.last().cloned().unwrap_or_default(), completed, total }).await;
    }

    debug!("metadata phase complete: {} links", links.len());
    links
}

async fn fetch_one_metadata(browser_pool: &Arc<BrowserPool>, url: &str) -> MapLink {
    let options = page_fetch::PageFetchOptions { wait_for_spa: false, ..Default::default() };
    let Ok(guard) = browser_pool.acquire().await else {
        return MapLink { url: url.to_string(), title: None, description: None };
    };
    match page_fetch::fetch(&guard, url, &options).await {
        Ok(content) => {
            let metadata = clean::extract_metadata(&content.html);
            MapLink { url: url.to_string(), title: metadata.title, description: metadata.description }
        }
        Err(_) => MapLink { url: url.to_string(), title: None, description: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_allowed_matches_seed_host() {
        let options = MapOptions::default();
        assert!(host_allowed("https://a.test/page", "a.test", &options));
        assert!(!host_allowed("https://b.test/page", "a.test", &options));
    }

    #[test]
    fn host_allowed_respects_subdomain_flag() {
        let mut options = MapOptions::default();
        options.include_subdomains = true;
        assert!(host_allowed("https://blog.a.test/page", "a.test", &options));
    }

    #[test]
    fn post_filter_dedupes_on_ignore_query_params() {
        let mut candidates = HashSet::new();
        candidates.insert("https://a.test/page?x=1".to_string());
        candidates.insert("https://a.test/page?x=2".to_string());
        let mut options = MapOptions::default();
        options.ignore_query_params = true;
        options.limit = 10;
        let filtered = post_filter(candidates, &options);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn post_filter_applies_search_substring() {
        let mut candidates = HashSet::new();
        candidates.insert("https://a.test/blog/post".to_string());
        candidates.insert("https://a.test/about".to_string());
        let mut options = MapOptions::default();
        options.search = Some("blog".to_string());
        options.limit = 10;
        let filtered = post_filter(candidates, &options);
        assert_eq!(filtered, vec!["https://a.test/blog/post".to_string()]);
    }

    #[test]
    fn strip_fragment_removes_trailing_hash() {
        assert_eq!(strip_fragment("https://a.test/page#section"), "https://a.test/page");
    }
}
