//! Chromium-based renderer using chromiumoxide.

use super::{scripts, NavigationResult, RenderContext, Renderer};
use crate::error::HarvestError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Error message fragments that mean the browser side is gone for good.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "target closed",
    "channel closed",
    "channelsenderror",
    "websocket",
    "ws error",
    "browser closed",
    "session closed",
    "no such target",
    "connection closed",
    "launch",
];

/// Classify a chromiumoxide failure into the harvest taxonomy.
pub fn classify_engine_error(operation: &str, err: impl std::fmt::Display) -> HarvestError {
    let message = format!("{operation}: {err}");
    let lower = message.to_ascii_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        HarvestError::Unavailable(message)
    } else {
        HarvestError::Transient(message)
    }
}

/// Environment variable naming an explicit browser binary.
pub const CHROMIUM_PATH_ENV: &str = "HARVESTER_CHROMIUM_PATH";

const PATH_BINARIES: &[&str] = &["google-chrome", "chromium", "chromium-browser"];

/// Install locations searched after the environment override, most
/// specific first.
pub fn chromium_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        let root = home.join(".harvester").join("chromium");
        if cfg!(target_os = "macos") {
            for arch in ["chrome-mac-arm64", "chrome-mac-x64"] {
                candidates.push(root.join(arch).join(
                    "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
                ));
            }
        } else {
            candidates.push(root.join("chrome-linux64").join("chrome"));
        }
        candidates.push(root.join("chrome"));
    }
    if cfg!(target_os = "macos") {
        candidates.push(PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ));
    }
    candidates
}

/// The browser binary to launch: the environment override if it exists,
/// then the first installed candidate, then the first match on `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    std::env::var_os(CHROMIUM_PATH_ENV)
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .or_else(|| chromium_candidates().into_iter().find(|p| p.exists()))
        .or_else(|| PATH_BINARIES.iter().find_map(|name| which::which(name).ok()))
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn new() -> Result<Self, HarvestError> {
        let chrome_path = find_chromium().ok_or_else(|| {
            HarvestError::Unavailable(
                format!("Chromium not found. Set {CHROMIUM_PATH_ENV} or install Chrome."),
            )
        })?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--window-size=1920,1080")
            .build()
            .map_err(|e| HarvestError::Unavailable(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Unavailable(format!("failed to launch Chromium: {e}")))?;

        // The CDP handler must be polled for the browser to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler: {e}");
                }
            }
            debug!("browser handler stopped");
        });

        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, HarvestError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| classify_engine_error("new page", e))?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<(), HarvestError> {
        // Browser is dropped when ChromiumRenderer is dropped
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult, HarvestError> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    status: 200, // chromiumoxide doesn't easily expose status
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(classify_engine_error("navigation failed", e)),
            Err(_) => Err(HarvestError::Transient(format!(
                "navigation timed out after {timeout_ms}ms"
            ))),
        }
    }

    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value, HarvestError> {
        let expression = scripts::wrap(script, args);
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| classify_engine_error("JS execution failed", e))?;

        let raw: String = result
            .into_value()
            .map_err(|e| HarvestError::Transient(format!("failed to convert JS result: {e:?}")))?;

        serde_json::from_str(&raw)
            .map_err(|e| HarvestError::Transient(format!("JS result is not JSON: {e}")))
    }

    async fn get_url(&self) -> Result<String, HarvestError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| classify_engine_error("failed to get URL", e))?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<(), HarvestError> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}
