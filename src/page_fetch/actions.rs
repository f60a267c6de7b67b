//! Action runner: executes an ordered list of page-interaction steps
//! against a live page, using an element-finding/polling idiom (`find_element`
//! retried in a loop against a deadline) and CDP screenshot capture params.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use serde::{Deserialize, Serialize};
use tracing::warn;

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    WaitMillis { milliseconds: u64 },
    WaitSelector { selector: String },
    Click { selector: String },
    #[serde(alias = "write")]
    Type { selector: String, text: String },
    Scroll { direction: ScrollDirection },
    Screenshot { #[serde(default = "default_full_page")] full_page: bool },
    Press { key: String },
    ExecuteJs { script: String },
    /// Called `scrape` in the system this was distilled from: a mid-flight
    /// snapshot of the current page, used inside multi-step workflows.
    Capture,
}

fn default_full_page() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub action_type: String,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape: Option<CapturedPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedPage {
    pub url: String,
    pub html: String,
}

impl ActionResult {
    fn ok(action_type: &str) -> Self {
        Self { success: true, action_type: action_type.to_string(), error: None, screenshot: None, scrape: None }
    }

    fn err(action_type: &str, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            action_type: action_type.to_string(),
            error: Some(error.to_string()),
            screenshot: None,
            scrape: None,
        }
    }
}

/// Run `actions` sequentially. A failing action is logged and recorded but
/// never aborts the remaining sequence: a single bad action is not fatal to
/// the overall scrape.
pub async fn run(page: &Page, actions: &[Action]) -> Vec<ActionResult> {
    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
        let result = run_one(page, action).await;
        if !result.success {
            warn!(action = %result.action_type, error = ?result.error, "action failed, continuing");
        }
        results.push(result);
    }
    results
}

async fn run_one(page: &Page, action: &Action) -> ActionResult {
    match action {
        Action::WaitMillis { milliseconds } => {
            tokio::time::sleep(Duration::from_millis(*milliseconds)).await;
            ActionResult::ok("wait")
        }
        Action::WaitSelector { selector } => match wait_for_selector(page, selector, DEFAULT_ELEMENT_TIMEOUT).await {
            Ok(()) => ActionResult::ok("wait"),
            Err(e) => ActionResult::err("wait", e),
        },
        Action::Click { selector } => match wait_for_selector(page, selector, DEFAULT_ELEMENT_TIMEOUT).await {
            Ok(()) => match page.find_element(selector.as_str()).await {
                Ok(element) => match element.click().await {
                    Ok(_) => ActionResult::ok("click"),
                    Err(e) => ActionResult::err("click", e),
                },
                Err(e) => ActionResult::err("click", e),
            },
            Err(e) => ActionResult::err("click", e),
        },
        Action::Type { selector, text } => match wait_for_selector(page, selector, DEFAULT_ELEMENT_TIMEOUT).await {
            Ok(()) => match page.find_element(selector.as_str()).await {
                Ok(element) => {
                    if let Err(e) = element.click().await {
                        ActionResult::err("type", e)
                    } else {
                        match element.type_str(text.as_str()).await {
                            Ok(_) => ActionResult::ok("type"),
                            Err(e) => ActionResult::err("type", e),
                        }
                    }
                }
                Err(e) => ActionResult::err("type", e),
            },
            Err(e) => ActionResult::err("type", e),
        },
        Action::Scroll { direction } => {
            let delta = match direction {
                ScrollDirection::Down => "window.innerHeight",
                ScrollDirection::Up => "-window.innerHeight",
            };
            match page.evaluate(format!("window.scrollBy(0, {delta})")).await {
                Ok(_) => ActionResult::ok("scroll"),
                Err(e) => ActionResult::err("scroll", e),
            }
        }
        Action::Screenshot { full_page } => {
            let params = CaptureScreenshotParams {
                format: Some(CaptureScreenshotFormat::Png),
                capture_beyond_viewport: Some(*full_page),
                ..Default::default()
            };
            match page.screenshot(params).await {
                Ok(bytes) => {
                    let mut result = ActionResult::ok("screenshot");
                    result.screenshot = Some(bytes);
                    result
                }
                Err(e) => ActionResult::err("screenshot", e),
            }
        }
        Action::Press { key } => {
            let script = format!(
                "document.activeElement && document.activeElement.dispatchEvent(new KeyboardEvent('keydown', {{key: {key:?}, bubbles: true}}))"
            );
            match page.evaluate(script).await {
                Ok(_) => ActionResult::ok("press"),
                Err(e) => ActionResult::err("press", e),
            }
        }
        Action::ExecuteJs { script } => match page.evaluate(script.as_str()).await {
            Ok(_) => ActionResult::ok("execute_js"),
            Err(e) => ActionResult::err("execute_js", e),
        },
        Action::Capture => {
            let url = page.url().await.ok().flatten().unwrap_or_default();
            match page.content().await {
                Ok(html) => {
                    let mut result = ActionResult::ok("capture");
                    result.scrape = Some(CapturedPage { url, html });
                    result
                }
                Err(e) => ActionResult::err("capture", e),
            }
        }
    }
}

async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if page.find_element(selector).await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for selector `{selector}`");
        }
        tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_action_accepts_write_alias() {
        let json = r#"{"type":"write","selector":"#q","text":"hello"}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert!(matches!(action, Action::Type { .. }));
    }

    #[test]
    fn screenshot_full_page_defaults_true() {
        let json = r#"{"type":"screenshot"}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        match action {
            Action::Screenshot { full_page } => assert!(full_page),
            _ => panic!("expected screenshot action"),
        }
    }

    #[test]
    fn action_result_err_carries_message() {
        let result = ActionResult::err("click", "element not found");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("element not found"));
    }
}
