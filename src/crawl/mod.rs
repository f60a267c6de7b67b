//! Crawl orchestrator: map → filter → scrape fan-out → persist, with
//! resumable manifest state. Phase order is map, filter, bounded fan-out,
//! file persistence, manifest append; progress is streamed out via
//! [`crate::map`]'s event-forwarding idiom while the map sub-operation
//! runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::browser_pool::BrowserPool;
use crate::events::{CrawlEvent, EventSender, MapEvent};
use crate::map::{self, MapOptions, SitemapMode};
use crate::page_fetch::WaitUntil;
use crate::scrape::{self, ScrapeData, ScrapeOptions, ScrapeResult};
use crate::url_normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlFormat {
    Markdown,
    Html,
    Json,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub limit: usize,
    pub max_depth: u32,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub resume: bool,
    pub formats: HashSet<CrawlFormat>,
    pub dedupe_similar_urls: bool,
    pub allow_external_links: bool,
    pub save_files: bool,
    pub concurrency: usize,
    pub wait_until: WaitUntil,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        let mut formats = HashSet::new();
        formats.insert(CrawlFormat::Markdown);
        Self {
            limit: 100,
            max_depth: 2,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            output_dir: None,
            resume: false,
            formats,
            dedupe_similar_urls: false,
            allow_external_links: false,
            save_files: true,
            concurrency: 10,
            wait_until: WaitUntil::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    scraped_urls: Vec<String>,
}

/// `crawl(seed, options) → stream of CrawlEvent`. Scrapes share
/// `browser_pool` so each still acquires its own isolated context; fan-out
/// is bounded by `options.concurrency`.
pub async fn crawl(
    browser_pool: &Arc<BrowserPool>,
    http: &reqwest::Client,
    seed: &str,
    options: &CrawlOptions,
    events: &EventSender<CrawlEvent>,
) {
    if let Err(message) = run(browser_pool, http, seed, options, events).await {
        events.send(CrawlEvent::Error { url: None, error: message, completed: None, total: None }).await;
        events.send(CrawlEvent::Complete { completed: 0, total: 0 }).await;
    }
}

async fn run(
    browser_pool: &Arc<BrowserPool>,
    http: &reqwest::Client,
    seed: &str,
    options: &CrawlOptions,
    events: &EventSender<CrawlEvent>,
) -> Result<(), String> {
    let manifest_path = options.output_dir.as_ref().map(|dir| dir.join("manifest.json"));

    let mut manifest = match (&manifest_path, options.resume) {
        (Some(path), true) => load_manifest(path).await,
        _ => Manifest::default(),
    };
    let scraped_urls: HashSet<String> = manifest.scraped_urls.iter().cloned().collect();

    let map_options = MapOptions {
        limit: options.limit,
        max_depth: options.max_depth,
        sitemap_mode: SitemapMode::Include,
        include_subdomains: false,
        search: None,
        ignore_query_params: false,
        allow_external_links: options.allow_external_links,
        concurrency: options.concurrency,
    };

    let (map_tx, mut map_rx) = crate::events::channel::<MapEvent>(crate::events::DEFAULT_CHANNEL_CAPACITY);
    let map_task = tokio::spawn({
        let browser_pool = Arc::clone(browser_pool);
        let http = http.clone();
        let seed = seed.to_string();
        async move {
            map::map(&http, &browser_pool, &seed, &map_options, &map_tx).await;
        }
    });

    let mut map_result = None;
    while let Some(event) = map_rx.next().await {
        if let MapEvent::Complete { result } = &event {
            map_result = Some(result.clone());
        }
        events.send(CrawlEvent::Mapping { event }).await;
    }
    let _ = map_task.await;

    let map_result = map_result.ok_or_else(|| "map phase produced no result".to_string())?;
    if !map_result.success {
        return Err(map_result.error.unwrap_or_else(|| "map phase failed".to_string()));
    }

    let candidates: Vec<String> = map_result.links.into_iter().map(|link| link.url).collect();
    let filtered = filter_links(candidates, &scraped_urls, options);
    let total = filtered.len();
    events.send(CrawlEvent::Progress { completed: 0, total }).await;

    if let Some(dir) = &options.output_dir {
        fs::create_dir_all(dir).await.map_err(|e| e.to_string())?;
    }

    let scrape_formats = derive_scrape_formats(&options.formats);
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut in_flight = FuturesUnordered::new();

    for url in filtered {
        let semaphore = Arc::clone(&semaphore);
        let browser_pool = Arc::clone(browser_pool);
        let scrape_options = ScrapeOptions { wait_until: options.wait_until, ..Default::default() };
        let scrape_formats = scrape_formats.clone();
        in_flight.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let result = scrape::scrape(&browser_pool, None, &url, &scrape_formats, &scrape_options, None, None).await;
            (url, result)
        }));
    }

    let mut completed = 0usize;
    while let Some(joined) = in_flight.next().await {
        completed += 1;
        match joined {
            Ok((url, result)) => {
                handle_scrape_outcome(url, result, options, &mut manifest, &manifest_path, events, completed, total).await;
            }
            Err(e) => {
                warn!("scrape task failed to join: {}", e);
                events
                    .send(CrawlEvent::Error { url: None, error: e.to_string(), completed: Some(completed), total: Some(total) })
                    .await;
                events.send(CrawlEvent::Progress { completed, total }).await;
            }
        }
    }

    events.send(CrawlEvent::Complete { completed, total }).await;
    Ok(())
}

async fn handle_scrape_outcome(
    url: String,
    result: ScrapeResult,
    options: &CrawlOptions,
    manifest: &mut Manifest,
    manifest_path: &Option<PathBuf>,
    events: &EventSender<CrawlEvent>,
    completed: usize,
    total: usize,
) {
    match result {
        ScrapeResult::Success { data, .. } => {
            if let Some(dir) = &options.output_dir {
                if let Err(e) = persist_page(dir, &url, &data, options).await {
                    warn!("failed to persist page for {}: {}", url, e);
                }
            }
            manifest.scraped_urls.push(url.clone());
            if let Some(path) = manifest_path {
                if let Err(e) = save_manifest(path, manifest).await {
                    warn!("failed to write manifest: {}", e);
                }
            }
            events.send(CrawlEvent::Page { url, data: Box::new(data), completed, total }).await;
        }
        ScrapeResult::Failure { error, .. } => {
            events.send(CrawlEvent::Error { url: Some(url), error, completed: Some(completed), total: Some(total) }).await;
        }
    }
    events.send(CrawlEvent::Progress { completed, total }).await;
}

/// Drop already-scraped URLs, apply include/exclude glob patterns, and
/// optionally dedupe via `url_normalize::dedupe_key`, preserving first
/// occurrence.
fn filter_links(candidates: Vec<String>, scraped_urls: &HashSet<String>, options: &CrawlOptions) -> Vec<String> {
    let mut seen_dedupe: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(candidates.len());

    for url in candidates {
        if scraped_urls.contains(&url) {
            continue;
        }
        if !options.include_patterns.is_empty() && !options.include_patterns.iter().any(|p| glob_match(p, &url)) {
            continue;
        }
        if options.exclude_patterns.iter().any(|p| glob_match(p, &url)) {
            continue;
        }
        if options.dedupe_similar_urls {
            match url_normalize::dedupe_key(&url) {
                Ok(key) => {
                    if !seen_dedupe.insert(key) {
                        continue;
                    }
                }
                Err(_) => continue,
            }
        }
        out.push(url);
    }
    out
}

/// `fnmatch`-style glob match (`*`, `?`, `[seq]`, `[!seq]`), translated to an
/// anchored regex, built directly against `regex` the way [`crate::detect`]
/// and `clean::markdown` already compile patterns.
fn glob_match(pattern: &str, text: &str) -> bool {
    match glob_to_regex(pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => pattern == text,
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    out.push('^');
                    chars.next();
                }
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                    if next == '\\' {
                        out.push('\\');
                    }
                    out.push(next);
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Map the crawl-level format list to the scrape formats needed to satisfy it:
/// `markdown|json → markdown`; `html|json → html`; no formats ⇒ markdown.
fn derive_scrape_formats(formats: &HashSet<CrawlFormat>) -> HashSet<scrape::Format> {
    let mut out = HashSet::new();
    let wants_markdown = formats.is_empty() || formats.contains(&CrawlFormat::Markdown) || formats.contains(&CrawlFormat::Json);
    let wants_html = formats.contains(&CrawlFormat::Html) || formats.contains(&CrawlFormat::Json);
    if wants_markdown {
        out.insert(scrape::Format::Markdown);
    }
    if wants_html {
        out.insert(scrape::Format::Html);
    }
    out
}

async fn persist_page(dir: &Path, url: &str, data: &ScrapeData, options: &CrawlOptions) -> Result<(), std::io::Error> {
    if !options.save_files {
        return Ok(());
    }

    let mut base = url::Url::parse(url)
        .map(|parsed| parsed.path().trim_start_matches('/').replace('/', "_"))
        .unwrap_or_default();
    if base.is_empty() {
        base = "index".to_string();
    }
    let base = unique_base(dir, &base, url).await;

    if options.formats.contains(&CrawlFormat::Markdown) {
        if let Some(markdown) = &data.markdown {
            let front_matter = format!(
                "---\nsource_url: {}\ntitle: {}\n---\n\n",
                url,
                data.metadata.title.as_deref().unwrap_or("")
            );
            fs::write(dir.join(format!("{base}.md")), format!("{front_matter}{markdown}")).await?;
        }
    }
    if options.formats.contains(&CrawlFormat::Html) {
        if let Some(html) = &data.html {
            fs::write(dir.join(format!("{base}.html")), html).await?;
        }
    }
    if options.formats.contains(&CrawlFormat::Json) {
        let payload = serde_json::json!({
            "url": url,
            "markdown": data.markdown,
            "html": data.html,
            "metadata": {
                "title": data.metadata.title,
                "description": data.metadata.description,
                "source_url": url,
            },
        });
        fs::write(dir.join(format!("{base}.json")), serde_json::to_vec_pretty(&payload).unwrap_or_default()).await?;
    }
    Ok(())
}

/// If `base` already names a file in `dir`, disambiguate with an 8-hex-char
/// suffix derived from the URL.
async fn unique_base(dir: &Path, base: &str, url: &str) -> String {
    let collides = [".md", ".html", ".json"]
        .iter()
        .any(|ext| std::fs::metadata(dir.join(format!("{base}{ext}"))).is_ok());
    if !collides {
        return base.to_string();
    }
    format!("{base}_{}", short_hash(url))
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

async fn load_manifest(path: &Path) -> Manifest {
    let Ok(bytes) = fs::read(path).await else { return Manifest::default() };
    match serde_json::from_slice(&bytes) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("manifest at {} is not valid JSON ({}); resuming from empty manifest", path.display(), e);
            Manifest::default()
        }
    }
}

async fn save_manifest(path: &Path, manifest: &Manifest) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, serde_json::to_vec_pretty(manifest).unwrap_or_default()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_handles_star_and_question_mark() {
        assert!(glob_match("https://a.test/blog/*", "https://a.test/blog/post-1"));
        assert!(!glob_match("https://a.test/blog/*", "https://a.test/docs/post-1"));
        assert!(glob_match("https://a.test/p?ge", "https://a.test/page"));
    }

    #[test]
    fn glob_match_handles_bracket_sets() {
        assert!(glob_match("https://a.test/v[123]", "https://a.test/v1"));
        assert!(!glob_match("https://a.test/v[123]", "https://a.test/v4"));
    }

    #[test]
    fn derive_scrape_formats_maps_corpus_to_c11() {
        let mut formats = HashSet::new();
        formats.insert(CrawlFormat::Json);
        let scrape_formats = derive_scrape_formats(&formats);
        assert!(scrape_formats.contains(&scrape::Format::Markdown));
        assert!(scrape_formats.contains(&scrape::Format::Html));
    }

    #[test]
    fn derive_scrape_formats_defaults_to_markdown_when_empty() {
        let scrape_formats = derive_scrape_formats(&HashSet::new());
        assert_eq!(scrape_formats.len(), 1);
        assert!(scrape_formats.contains(&scrape::Format::Markdown));
    }

    #[test]
    fn filter_links_drops_already_scraped_and_applies_patterns() {
        let mut scraped = HashSet::new();
        scraped.insert("https://a.test/done".to_string());
        let mut options = CrawlOptions::default();
        options.include_patterns = vec!["https://a.test/blog/*".to_string()];

        let candidates = vec![
            "https://a.test/done".to_string(),
            "https://a.test/blog/one".to_string(),
            "https://a.test/about".to_string(),
        ];
        let filtered = filter_links(candidates, &scraped, &options);
        assert_eq!(filtered, vec!["https://a.test/blog/one".to_string()]);
    }
}
