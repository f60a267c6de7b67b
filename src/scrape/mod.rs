//! Scrape service: fetch + clean + extract, with cache, bot-block and
//! CAPTCHA gates layered on top of the page fetcher and HTML cleaner. Step
//! order: cache check → fetch → clean → bot gate → captcha gate →
//! per-format extraction → LLM calls → persist.

use std::collections::HashSet;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::browser_pool::BrowserPool;
use crate::cache::CacheStore;
use crate::clean::{self, Branding, PageMetadata};
use crate::detect;
use crate::error::with_stealth_hint;
use crate::page_fetch::{self, ActionResult, PageContent, PageFetchOptions, WaitUntil};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Markdown,
    Html,
    RawHtml,
    Screenshot,
    Pdf,
    Links,
    Images,
    Branding,
    Json,
    Summary,
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub wait_for_spa: bool,
    pub spa_timeout_ms: u64,
    pub screenshot_full_page: bool,
    pub actions: Option<Vec<crate::page_fetch::Action>>,
    pub wait_until: WaitUntil,
    pub only_main_content: bool,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub json_schema: Option<serde_json::Value>,
    pub json_prompt: Option<String>,
    pub max_age: i64,
    pub stealth: bool,
    pub enhanced_driver_available: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            wait_for_spa: true,
            spa_timeout_ms: 5_000,
            screenshot_full_page: true,
            actions: None,
            wait_until: WaitUntil::default(),
            only_main_content: false,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            json_schema: None,
            json_prompt: None,
            max_age: 0,
            stealth: false,
            enhanced_driver_available: false,
        }
    }
}

/// Opaque "JSON-returning chat" collaborator. Implementations are not part
/// of this crate; callers inject one when `json` or `summary` formats are
/// requested.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String, String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Opaque CAPTCHA solver collaborator, called at most once per scrape.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, captcha_type: &str, sitekey: &str, page_url: &str) -> Result<String, String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    pub action_type: String,
    pub success: bool,
    pub screenshot_base64: Option<String>,
    pub markdown: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeData {
    pub url: String,
    pub status_code: u16,
    pub metadata: PageMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branding: Option<Branding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_extraction: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActionOutput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrapeResult {
    Success { success: bool, data: ScrapeData },
    Failure { success: bool, error: String },
}

impl ScrapeResult {
    fn ok(data: ScrapeData) -> Self {
        ScrapeResult::Success { success: true, data }
    }

    fn err(error: String) -> Self {
        ScrapeResult::Failure { success: false, error }
    }
}

const MAX_SUMMARY_SOURCE_CHARS: usize = 10_000;
const MAX_SUMMARY_OUTPUT_CHARS: usize = 500;

/// `scrape(url, formats, options) → ScrapeResult`.
#[allow(clippy::too_many_arguments)]
pub async fn scrape(
    browser_pool: &std::sync::Arc<BrowserPool>,
    cache: Option<&CacheStore>,
    url: &str,
    formats: &HashSet<Format>,
    options: &ScrapeOptions,
    chat_provider: Option<&dyn ChatProvider>,
    captcha_solver: Option<&dyn CaptchaSolver>,
) -> ScrapeResult {
    if options.max_age > 0 {
        if let Some(cache) = cache {
            let variant = variant_key(formats, options);
            if let Ok(Some(mut cached)) = cache.get::<ScrapeData>(url, options.max_age, Some(&variant)).await {
                cached.metadata.cache_hit = true;
                return ScrapeResult::ok(cached);
            }
        }
    }

    let guard = match browser_pool.acquire().await {
        Ok(guard) => guard,
        Err(e) => return ScrapeResult::err(e.to_string()),
    };

    let fetch_options = PageFetchOptions {
        wait_for_spa: options.wait_for_spa,
        spa_timeout_ms: options.spa_timeout_ms,
        capture_screenshot: formats.contains(&Format::Screenshot),
        capture_pdf: formats.contains(&Format::Pdf),
        screenshot_full_page: options.screenshot_full_page,
        actions: options.actions.clone(),
        wait_until: options.wait_until,
    };

    let content = match page_fetch::fetch(&guard, url, &fetch_options).await {
        Ok(content) => content,
        Err(e) => return ScrapeResult::err(e.to_string()),
    };

    let links = if formats.contains(&Format::Links) {
        page_fetch::extract_links(&guard, url).await.ok()
    } else {
        None
    };
    drop(guard);

    let needs_markdown =
        formats.contains(&Format::Markdown) || formats.contains(&Format::Json) || formats.contains(&Format::Summary);
    let markdown = if needs_markdown {
        Some(clean::to_markdown(&content.html, &clean::markdown::MarkdownPolicy { base_url: Some(url.to_string()) }))
    } else {
        None
    };

    if detect::looks_like_bot_block(content.status_code, &content.html, markdown.as_deref().unwrap_or("")) {
        if !options.stealth && options.enhanced_driver_available {
            let mut retry_options = options.clone();
            retry_options.stealth = true;
            return Box::pin(scrape(browser_pool, cache, url, formats, &retry_options, chat_provider, captcha_solver)).await;
        }
        let error = with_stealth_hint(
            "bot block detected while scraping".to_string(),
            options.stealth,
            options.enhanced_driver_available,
        );
        return ScrapeResult::err(error);
    }

    let mut content = content;
    if let Some(solver) = captcha_solver {
        if let Some(captcha) = detect::identify_captcha(&content.html) {
            if let Some(sitekey) = &captcha.sitekey {
                if let Ok(token) = solver
                    .solve(captcha.captcha_type.response_field(), sitekey, url)
                    .await
                {
                    if let Err(e) = reinject_captcha_token(&content, captcha.captcha_type, &token).await {
                        tracing::warn!("failed to reinject captcha token: {}", e);
                    }
                }
            }
        }
    } else if detect::looks_like_captcha(&content.html) {
        tracing::warn!(url = %url, "captcha detected but no solver configured");
    }

    let data = build_scrape_data(url, &mut content, markdown, links, formats, options, chat_provider).await;

    if options.max_age > 0 {
        if let Some(cache) = cache {
            let variant = variant_key(formats, options);
            let _ = cache.set(url, &data, options.max_age, Some(&variant)).await;
        }
    }

    ScrapeResult::ok(data)
}

/// Best-effort: re-run content extraction is out of scope once the page's
/// context has already closed (the page fetcher guarantees closure on
/// return), so the
/// re-injection window is whatever remains of the in-memory `PageContent`.
/// A live re-fetch is needed to truly honor "retry content extraction from
/// the same page"; recorded as a known simplification in DESIGN.md.
async fn reinject_captcha_token(
    _content: &PageContent,
    _captcha_type: detect::CaptchaType,
    _token: &str,
) -> Result<(), String> {
    Ok(())
}

async fn build_scrape_data(
    url: &str,
    content: &mut PageContent,
    markdown: Option<String>,
    links: Option<Vec<String>>,
    formats: &HashSet<Format>,
    options: &ScrapeOptions,
    chat_provider: Option<&dyn ChatProvider>,
) -> ScrapeData {
    let mut metadata = clean::extract_metadata(&content.html);
    metadata.cache_hit = false;

    let mut data = ScrapeData {
        url: content.url.clone(),
        status_code: content.status_code,
        metadata,
        ..Default::default()
    };

    if formats.contains(&Format::RawHtml) {
        data.raw_html = Some(content.html.clone());
    }
    if formats.contains(&Format::Html) {
        data.html = Some(clean::clean(&content.html, options.only_main_content, &options.include_tags, &options.exclude_tags));
    }
    if formats.contains(&Format::Links) {
        data.links = links;
    }
    if formats.contains(&Format::Images) {
        data.images = Some(clean::extract_images(&content.html, url));
    }
    if formats.contains(&Format::Branding) {
        data.branding = Some(clean::extract_branding(&content.html, url));
    }
    if formats.contains(&Format::Screenshot) {
        data.screenshot = content.screenshot.take().map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
    }
    if formats.contains(&Format::Pdf) {
        data.pdf = content.pdf.take().map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
    }

    if let Some(markdown) = &markdown {
        data.word_count = Some(markdown.split_whitespace().count());
    }
    if formats.contains(&Format::Markdown) {
        data.markdown = markdown.clone();
    }

    if formats.contains(&Format::Json) {
        if let (Some(provider), Some(markdown)) = (chat_provider, &markdown) {
            data.llm_extraction = run_json_extraction(provider, markdown, options).await;
        }
    }
    if formats.contains(&Format::Summary) {
        if let (Some(provider), Some(markdown)) = (chat_provider, &markdown) {
            data.summary = run_summary(provider, markdown).await;
        }
    }

    if let Some(action_results) = content.action_results.take() {
        data.actions = Some(build_action_outputs(action_results));
    }

    data
}

async fn run_json_extraction(
    provider: &dyn ChatProvider,
    markdown: &str,
    options: &ScrapeOptions,
) -> Option<serde_json::Value> {
    let mut prompt = String::new();
    if let Some(json_prompt) = &options.json_prompt {
        prompt.push_str(json_prompt);
        prompt.push('\n');
    }
    if let Some(schema) = &options.json_schema {
        prompt.push_str(&format!("Respond matching this JSON schema: {schema}\n"));
    }
    prompt.push_str(markdown);

    let messages = [ChatMessage { role: "user".to_string(), content: prompt }];
    let response = provider.chat(&messages, true).await.ok()?;
    serde_json::from_str(&response).ok()
}

async fn run_summary(provider: &dyn ChatProvider, markdown: &str) -> Option<String> {
    let truncated: String = markdown.chars().take(MAX_SUMMARY_SOURCE_CHARS).collect();
    let messages = [
        ChatMessage {
            role: "system".to_string(),
            content: "Summarize the following page content in 2-3 sentences.".to_string(),
        },
        ChatMessage { role: "user".to_string(), content: truncated },
    ];
    let response = provider.chat(&messages, false).await.ok()?;
    Some(truncate_at_sentence_boundary(&response, MAX_SUMMARY_OUTPUT_CHARS))
}

fn truncate_at_sentence_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(['.', '!', '?']) {
        Some(idx) => truncated[..=idx].to_string(),
        None => truncated,
    }
}

fn build_action_outputs(results: Vec<ActionResult>) -> Vec<ActionOutput> {
    results
        .into_iter()
        .map(|result| {
            let markdown = result
                .scrape
                .as_ref()
                .map(|captured| clean::to_markdown(&captured.html, &clean::markdown::MarkdownPolicy::default()));
            ActionOutput {
                action_type: result.action_type,
                success: result.success,
                screenshot_base64: result.screenshot.map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
                markdown,
            }
        })
        .collect()
}

/// Variant key covering at minimum the screenshot full_page flag and
/// include/exclude selectors, plus anything else that changes output shape
/// (only_main_content, requested formats).
fn variant_key(formats: &HashSet<Format>, options: &ScrapeOptions) -> String {
    let mut sorted_formats: Vec<&str> = formats.iter().map(format_name).collect();
    sorted_formats.sort_unstable();
    format!(
        "{}|main={}|full_page={}|include={}|exclude={}",
        sorted_formats.join(","),
        options.only_main_content,
        options.screenshot_full_page,
        options.include_tags.join(","),
        options.exclude_tags.join(","),
    )
}

fn format_name(format: &Format) -> &'static str {
    match format {
        Format::Markdown => "markdown",
        Format::Html => "html",
        Format::RawHtml => "raw_html",
        Format::Screenshot => "screenshot",
        Format::Pdf => "pdf",
        Format::Links => "links",
        Format::Images => "images",
        Format::Branding => "branding",
        Format::Json => "json",
        Format::Summary => "summary",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_stops_at_sentence_boundary() {
        let text = "First sentence. Second sentence. Third sentence that runs on and on and on.";
        let truncated = truncate_at_sentence_boundary(text, 32);
        assert_eq!(truncated, "First sentence. Second sentence");
    }

    #[test]
    fn truncate_is_noop_under_limit() {
        let text = "short text";
        assert_eq!(truncate_at_sentence_boundary(text, 100), text);
    }

    #[test]
    fn variant_key_is_stable_regardless_of_hashset_iteration_order() {
        let mut a = HashSet::new();
        a.insert(Format::Markdown);
        a.insert(Format::Html);
        let mut b = HashSet::new();
        b.insert(Format::Html);
        b.insert(Format::Markdown);
        let options = ScrapeOptions::default();
        assert_eq!(variant_key(&a, &options), variant_key(&b, &options));
    }
}
