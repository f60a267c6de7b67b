//! Page fetcher: navigate a browser context, apply a wait strategy,
//! optionally drive the action runner, and capture the resulting page.
//!
//! Uses a navigate/poll idiom (`page.goto` then `page.wait_for_navigation`,
//! a manual poll loop for "has the DOM settled yet"). The per-request
//! isolated context and stealth injection come from
//! [`crate::browser_pool::PooledBrowserGuard`].

pub mod actions;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

use crate::browser_pool::PooledBrowserGuard;
pub use actions::{Action, ActionResult};

const SPA_POLL_INTERVAL: Duration = Duration::from_millis(200);
const SPA_STABLE_COUNT: usize = 3;
const RESIDUAL_JS_SLEEP: Duration = Duration::from_millis(500);
const STATUS_CAPTURE_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    Commit,
    DomContentLoaded,
    #[default]
    Load,
    NetworkIdle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageFetchOptions {
    pub wait_for_spa: bool,
    pub spa_timeout_ms: u64,
    pub capture_screenshot: bool,
    pub capture_pdf: bool,
    pub screenshot_full_page: bool,
    pub actions: Option<Vec<Action>>,
    pub wait_until: WaitUntil,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub html: String,
    pub title: Option<String>,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_results: Option<Vec<ActionResult>>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to acquire isolated browser context: {0}")]
    ContextAcquisition(#[source] anyhow::Error),
    #[error("navigation to {url} failed: {source}")]
    Navigation { url: String, #[source] source: anyhow::Error },
    #[error("failed to capture page content: {0}")]
    Capture(#[source] anyhow::Error),
}

/// `fetch(url, options) → PageContent`. The context is guaranteed to
/// close on every exit path because it lives in an [`crate::browser_pool::IsolatedPage`]
/// whose `Drop` tears down the browser context regardless of how this
/// function returns.
pub async fn fetch(guard: &PooledBrowserGuard, url: &str, options: &PageFetchOptions) -> Result<PageContent, FetchError> {
    let isolated = guard.isolated_page().await.map_err(FetchError::ContextAcquisition)?;
    let page = isolated.page();

    let status_rx = watch_response_status(page, url).await;

    page.goto(url)
        .await
        .map_err(|e| FetchError::Navigation { url: url.to_string(), source: e.into() })?;

    wait_for_load_state(page, options.wait_until)
        .await
        .map_err(|e| FetchError::Navigation { url: url.to_string(), source: e })?;

    if options.wait_for_spa && options.wait_until != WaitUntil::NetworkIdle {
        wait_for_stable_content(page, options.spa_timeout_ms).await;
    }

    let action_results = match &options.actions {
        Some(actions) if !actions.is_empty() => Some(actions::run(page, actions).await),
        _ => None,
    };

    if options.wait_until != WaitUntil::NetworkIdle {
        tokio::time::sleep(RESIDUAL_JS_SLEEP).await;
    }

    let html = page.content().await.map_err(|e| FetchError::Capture(e.into()))?;
    let title = page.get_title().await.ok().flatten();
    let status_code = status_rx.await.unwrap_or(200);

    let screenshot = if options.capture_screenshot {
        capture_screenshot(page, options.screenshot_full_page).await
    } else {
        None
    };
    let pdf = if options.capture_pdf { capture_pdf(page).await } else { None };

    Ok(PageContent {
        url: page.url().await.ok().flatten().unwrap_or_else(|| url.to_string()),
        html,
        title,
        status_code,
        screenshot,
        pdf,
        action_results,
    })
}

/// Side channel: re-navigate to `url` in a throwaway context and walk the
/// rendered DOM for absolute `http(s)` anchor hrefs, mirroring
/// `page_extractor::js_scripts::LINKS_SCRIPT`.
pub async fn extract_links(guard: &PooledBrowserGuard, url: &str) -> Result<Vec<String>, FetchError> {
    let isolated = guard.isolated_page().await.map_err(FetchError::ContextAcquisition)?;
    let page = isolated.page();

    page.goto(url)
        .await
        .map_err(|e| FetchError::Navigation { url: url.to_string(), source: e.into() })?;
    let _ = page.wait_for_navigation().await;

    let js_result = page
        .evaluate(EXTRACT_LINKS_SCRIPT)
        .await
        .map_err(|e| FetchError::Capture(e.into()))?;

    let links: Vec<String> = js_result
        .into_value()
        .map_err(|e| FetchError::Capture(anyhow::anyhow!("failed to parse links: {e}")))?;

    Ok(links)
}

const EXTRACT_LINKS_SCRIPT: &str = r"
    (() => {
        return Array.from(document.querySelectorAll('a[href]'))
            .map(a => {
                try {
                    const u = new URL(a.getAttribute('href'), window.location.href);
                    return ['http:', 'https:'].includes(u.protocol) ? u.href : null;
                } catch (e) {
                    return null;
                }
            })
            .filter(href => href !== null);
    })()
";

async fn wait_for_load_state(page: &Page, wait_until: WaitUntil) -> anyhow::Result<()> {
    match wait_until {
        WaitUntil::Commit => Ok(()),
        WaitUntil::DomContentLoaded => poll_ready_state(page, "interactive").await,
        WaitUntil::Load => {
            page.wait_for_navigation().await?;
            Ok(())
        }
        WaitUntil::NetworkIdle => {
            page.wait_for_navigation().await?;
            wait_for_network_idle(page).await;
            Ok(())
        }
    }
}

async fn poll_ready_state(page: &Page, minimum: &str) -> anyhow::Result<()> {
    let rank = |state: &str| match state {
        "loading" => 0,
        "interactive" => 1,
        _ => 2,
    };
    let target_rank = rank(minimum);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        if let Ok(result) = page.evaluate("document.readyState").await {
            if let Ok(state) = result.into_value::<String>() {
                if rank(&state) >= target_rank {
                    return Ok(());
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for document.readyState >= {minimum}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Best-effort network-idle detection: poll the Resource Timing API until
/// the count of observed resource entries stops growing for two consecutive
/// polls. There is no dedicated CDP "idle" signal wired up here, so this
/// approximates the Playwright/Puppeteer networkidle heuristic in user
/// space.
async fn wait_for_network_idle(page: &Page) {
    let mut last_count = -1i64;
    let mut stable_polls = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);

    while tokio::time::Instant::now() < deadline {
        let count = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|r| r.into_value::<i64>().ok())
            .unwrap_or(-1);

        if count == last_count {
            stable_polls += 1;
            if stable_polls >= 2 {
                return;
            }
        } else {
            stable_polls = 0;
        }
        last_count = count;
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}

/// SPA stability probe: hash the current HTML every 200ms,
/// declare stable after three consecutive identical hashes, capped at
/// `spa_timeout_ms`. Optionally waits for a content heading first.
async fn wait_for_stable_content(page: &Page, spa_timeout_ms: u64) {
    let _ = actions::run(
        page,
        &[Action::WaitSelector { selector: "h1, h2, main, article".to_string() }],
    )
    .await;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(spa_timeout_ms.max(1));
    let mut last_hash: Option<u64> = None;
    let mut matches = 0;

    while tokio::time::Instant::now() < deadline {
        let Ok(html) = page.content().await else {
            tokio::time::sleep(SPA_POLL_INTERVAL).await;
            continue;
        };
        let hash = hash_str(&html);
        if Some(hash) == last_hash {
            matches += 1;
            if matches >= SPA_STABLE_COUNT {
                return;
            }
        } else {
            matches = 1;
            last_hash = Some(hash);
        }
        tokio::time::sleep(SPA_POLL_INTERVAL).await;
    }
}

fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Listen for the first `Network.responseReceived` event whose URL matches
/// the navigation target and report its status on a oneshot channel. Given
/// up on (never sent) after [`STATUS_CAPTURE_WINDOW`], in which case callers
/// fall back to 200.
async fn watch_response_status(page: &Page, url: &str) -> oneshot::Receiver<u16> {
    let (tx, rx) = oneshot::channel();
    let target = url.to_string();

    match page.event_listener::<EventResponseReceived>().await {
        Ok(mut events) => {
            tokio::spawn(async move {
                let deadline = tokio::time::sleep(STATUS_CAPTURE_WINDOW);
                tokio::pin!(deadline);
                let mut tx = Some(tx);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        event = events.next() => {
                            match event {
                                Some(event) => {
                                    if event.response.url == target || event.response.url.starts_with(&target) {
                                        if let Some(tx) = tx.take() {
                                            let _ = tx.send(event.response.status as u16);
                                        }
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                }
                drop(tx);
            });
        }
        Err(e) => {
            warn!("failed to attach response listener, status will default to 200: {}", e);
            drop(tx);
        }
    }

    rx
}

async fn capture_screenshot(page: &Page, full_page: bool) -> Option<Vec<u8>> {
    use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
    let params = CaptureScreenshotParams {
        format: Some(CaptureScreenshotFormat::Png),
        capture_beyond_viewport: Some(full_page),
        ..Default::default()
    };
    match page.screenshot(params).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("screenshot capture failed: {}", e);
            None
        }
    }
}

async fn capture_pdf(page: &Page) -> Option<Vec<u8>> {
    match page.pdf(PrintToPdfParams::default()).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("pdf capture failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_defaults_to_load() {
        assert_eq!(WaitUntil::default(), WaitUntil::Load);
    }

    #[test]
    fn hash_str_is_stable_for_identical_input() {
        assert_eq!(hash_str("same"), hash_str("same"));
        assert_ne!(hash_str("a"), hash_str("b"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let json = r#"{"wait_for_spa": true, "spa_timeout_ms": 5000, "capture_screenshot": false, "capture_pdf": false, "screenshot_full_page": true, "wait_until": "networkidle"}"#;
        let options: PageFetchOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.wait_until, WaitUntil::NetworkIdle);
        assert!(options.actions.is_none());
    }
}
