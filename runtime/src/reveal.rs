//! Reveal controller: plans and issues scroll/trigger actions against a
//! region, independent of what the region contains.
//!
//! Waiting for content after an action is not done here; callers pair each
//! step with a readiness poll. When the primary region cannot be located the
//! controller degrades to the whole document with a reduced step budget.

use crate::catalog::{GallerySpec, Locator};
use crate::error::HarvestError;
use crate::renderer::{locate_first, scripts, RenderContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Fewest offsets planned for content taller than one view.
pub const MIN_PLANNED_STEPS: usize = 3;
/// Most offsets planned, whatever the extent.
pub const MAX_PLANNED_STEPS: usize = 5;
/// Step budget on the whole-document fallback path.
pub const FALLBACK_MAX_STEPS: usize = 3;

/// What a reveal step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealAction {
    ScrollToOffset,
    ScrollToEnd,
    /// Click the gallery trigger.
    Trigger,
}

impl RevealAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevealAction::ScrollToOffset => "scroll_to_offset",
            RevealAction::ScrollToEnd => "scroll_to_end",
            RevealAction::Trigger => "trigger",
        }
    }
}

/// One discrete reveal action. Consumed immediately, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevealStep {
    /// 1-based position in the plan; the trigger step is 0.
    pub index: usize,
    pub target_offset: f64,
    pub action: RevealAction,
}

impl RevealStep {
    pub fn trigger() -> Self {
        Self {
            index: 0,
            target_offset: 0.0,
            action: RevealAction::Trigger,
        }
    }
}

/// Scrollable extent of a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionDimensions {
    pub scroll_height: f64,
    pub client_height: f64,
}

/// The area reveal steps act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    /// A located container, by the selector that resolved.
    Container { selector: String },
    /// The whole document.
    Document,
}

impl Region {
    /// Selector argument for page scripts (`null` for the document).
    pub fn selector_arg(&self) -> Value {
        match self {
            Region::Container { selector } => Value::from(selector.as_str()),
            Region::Document => Value::Null,
        }
    }

    /// The region as a locator, `None` for the document.
    pub fn locator(&self) -> Option<Locator> {
        match self {
            Region::Container { selector } => Some(Locator::css(selector.clone())),
            Region::Document => None,
        }
    }
}

/// Divide the region's scrollable extent into evenly spaced offsets.
///
/// Content that fits in one view yields no steps. Otherwise one step per
/// view height, clamped to `MIN_PLANNED_STEPS..=MAX_PLANNED_STEPS` and never
/// more than `max_steps`. The last step always scrolls to the end.
pub fn plan_steps(dims: RegionDimensions, max_steps: usize) -> Vec<RevealStep> {
    let extent = dims.scroll_height - dims.client_height;
    if max_steps == 0 || !extent.is_finite() || extent <= 1.0 {
        return Vec::new();
    }
    let views = if dims.client_height > 0.0 {
        (dims.scroll_height / dims.client_height).ceil() as usize
    } else {
        MAX_PLANNED_STEPS
    };
    let count = views
        .clamp(MIN_PLANNED_STEPS, MAX_PLANNED_STEPS)
        .min(max_steps);

    (1..=count)
        .map(|i| RevealStep {
            index: i,
            target_offset: (extent * i as f64 / count as f64).round(),
            action: if i == count {
                RevealAction::ScrollToEnd
            } else {
                RevealAction::ScrollToOffset
            },
        })
        .collect()
}

/// Drives reveal steps for one gallery on one page.
pub struct RevealController<'a> {
    ctx: &'a dyn RenderContext,
    gallery: &'a GallerySpec,
    region: Region,
    fallback: bool,
    max_steps: usize,
}

impl<'a> RevealController<'a> {
    /// A controller that targets the whole document until
    /// [`resolve_region`](Self::resolve_region) is called.
    pub fn new(ctx: &'a dyn RenderContext, gallery: &'a GallerySpec, max_steps: usize) -> Self {
        Self {
            ctx,
            gallery,
            region: Region::Document,
            fallback: false,
            max_steps,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Whether the degraded whole-document path is in use.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Step budget for the current region.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Find the first gallery container alternative present on the page.
    pub async fn locate_region(&self) -> Result<Option<String>, HarvestError> {
        Ok(locate_first(self.ctx, &self.gallery.container)
            .await?
            .map(|handle| handle.selector))
    }

    /// Target the located container, or fall back to the document when
    /// there is none.
    ///
    /// The fallback is always available and never an error; it is logged
    /// and flagged via [`is_fallback`](Self::is_fallback).
    pub fn use_region(&mut self, located: Option<String>) -> &Region {
        match located {
            Some(selector) => {
                debug!(selector = %selector, "reveal region located");
                self.region = Region::Container { selector };
                self.fallback = false;
            }
            None => {
                self.max_steps = self.max_steps.min(FALLBACK_MAX_STEPS);
                warn!(
                    locator = %self.gallery.container,
                    max_steps = self.max_steps,
                    "reveal region not found, falling back to whole document"
                );
                self.region = Region::Document;
                self.fallback = true;
            }
        }
        &self.region
    }

    /// [`locate_region`](Self::locate_region) followed by
    /// [`use_region`](Self::use_region).
    pub async fn resolve_region(&mut self) -> Result<&Region, HarvestError> {
        let located = self.locate_region().await?;
        Ok(self.use_region(located))
    }

    /// Measure the current region.
    pub async fn dimensions(&self) -> Result<RegionDimensions, HarvestError> {
        let value = self
            .ctx
            .evaluate(scripts::REGION_EXTENT, &[self.region.selector_arg()])
            .await?;
        if value.is_null() {
            return Err(HarvestError::NotFound(format!(
                "region {:?} vanished",
                self.region
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| HarvestError::Transient(format!("malformed region extent: {e}")))
    }

    /// Plan steps for the given dimensions within this controller's budget.
    pub fn plan(&self, dims: RegionDimensions) -> Vec<RevealStep> {
        plan_steps(dims, self.max_steps)
    }

    /// Issue exactly one action. Returns once it is issued; does not wait
    /// for content.
    pub async fn apply_step(&self, step: &RevealStep) -> Result<(), HarvestError> {
        match step.action {
            RevealAction::Trigger => {
                if self.gallery.trigger.is_empty() {
                    return Err(HarvestError::NotFound("no trigger configured".into()));
                }
                let clicked = self
                    .ctx
                    .evaluate(scripts::CLICK_FIRST, &[self.gallery.trigger.to_json()])
                    .await?;
                match clicked.as_str() {
                    Some(selector) => {
                        debug!(selector, "trigger clicked");
                        Ok(())
                    }
                    None => Err(HarvestError::NotFound(format!(
                        "trigger {}",
                        self.gallery.trigger
                    ))),
                }
            }
            RevealAction::ScrollToOffset | RevealAction::ScrollToEnd => {
                let to_end = step.action == RevealAction::ScrollToEnd;
                let issued = self
                    .ctx
                    .evaluate(
                        scripts::SCROLL_REGION,
                        &[
                            self.region.selector_arg(),
                            Value::from(step.target_offset),
                            Value::from(to_end),
                        ],
                    )
                    .await?;
                if issued.as_bool() == Some(true) {
                    debug!(index = step.index, offset = step.target_offset, "scroll issued");
                    Ok(())
                } else {
                    Err(HarvestError::NotFound(format!(
                        "region {:?} vanished before step {}",
                        self.region, step.index
                    )))
                }
            }
        }
    }

    /// Copy deferred references into `src` inside the region.
    ///
    /// Whether a site's lazy loader honours this is unverified, so it is
    /// only run when configured.
    pub async fn prime_deferred(&self) -> Result<usize, HarvestError> {
        let deferred: Vec<&str> = self
            .gallery
            .reference_attributes
            .iter()
            .map(String::as_str)
            .filter(|a| *a != "src")
            .collect();
        let primed = self
            .ctx
            .evaluate(
                scripts::PRIME_DEFERRED,
                &[
                    self.region.selector_arg(),
                    Value::from(self.gallery.item_selector.as_str()),
                    Value::from(deferred),
                ],
            )
            .await?;
        Ok(primed.as_u64().unwrap_or(0) as usize)
    }

    /// Resolved item references currently in the region, in document order.
    pub async fn collect_references(&self) -> Result<Vec<String>, HarvestError> {
        let value = self
            .ctx
            .evaluate(
                scripts::COLLECT_REFERENCES,
                &[
                    self.region.selector_arg(),
                    Value::from(self.gallery.item_selector.as_str()),
                    Value::from(self.gallery.reference_attributes.clone()),
                    Value::from(self.gallery.placeholder_markers.clone()),
                ],
            )
            .await?;
        if value.is_null() {
            return Err(HarvestError::NotFound(format!(
                "region {:?} vanished before extraction",
                self.region
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| HarvestError::Transient(format!("malformed reference list: {e}")))
    }
}
