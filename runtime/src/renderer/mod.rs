//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide). The harvester only
//! consumes a context; creating and tearing it down is the caller's job.

pub mod chromium;
pub mod scripts;

use crate::catalog::Locator;
use crate::error::HarvestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// `document.readyState` of the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "loading" => Some(ReadyState::Loading),
            "interactive" => Some(ReadyState::Interactive),
            "complete" => Some(ReadyState::Complete),
            _ => None,
        }
    }
}

/// Snapshot of a located element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// The selector that resolved.
    #[serde(default)]
    pub selector: String,
    pub tag: String,
    pub visible: bool,
    pub scroll_height: f64,
    pub client_height: f64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, HarvestError>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<(), HarvestError>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
///
/// Methods take `&self`: the harvester owns the context exclusively for one
/// harvest and drives it sequentially.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult, HarvestError>;

    /// Evaluate a function body (see [`scripts`]) with JSON arguments.
    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value, HarvestError>;

    /// Locate the first element matching `selector`.
    async fn locate(&self, selector: &str) -> Result<Option<ElementHandle>, HarvestError> {
        let value = self
            .evaluate(scripts::LOCATE, &[Value::from(selector)])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let mut handle: ElementHandle = serde_json::from_value(value)
            .map_err(|e| HarvestError::Transient(format!("malformed locate result: {e}")))?;
        handle.selector = selector.to_string();
        Ok(Some(handle))
    }

    /// Current `document.readyState`.
    async fn ready_state(&self) -> Result<ReadyState, HarvestError> {
        let value = self.evaluate(scripts::READY_STATE, &[]).await?;
        value
            .as_str()
            .and_then(ReadyState::parse)
            .ok_or_else(|| HarvestError::Transient(format!("unexpected readyState {value}")))
    }

    /// Get the current URL.
    async fn get_url(&self) -> Result<String, HarvestError>;

    /// Close this context.
    async fn close(self: Box<Self>) -> Result<(), HarvestError>;
}

/// Locate the first alternative of `locator` that resolves.
pub async fn locate_first(
    ctx: &dyn RenderContext,
    locator: &Locator,
) -> Result<Option<ElementHandle>, HarvestError> {
    for selector in locator.alternatives() {
        if let Some(handle) = ctx.locate(selector).await? {
            return Ok(Some(handle));
        }
    }
    Ok(None)
}

/// A renderer used when Chromium is unavailable. Every context request
/// fails with `Unavailable`.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, HarvestError> {
        Err(HarvestError::Unavailable("browser not available".into()))
    }
    async fn shutdown(&self) -> Result<(), HarvestError> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
