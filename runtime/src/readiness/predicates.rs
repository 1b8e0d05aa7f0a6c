//! Reusable readiness conditions over a live page.
//!
//! Observation is split from judgement: `observe` reads the page (never
//! mutating it), `is_satisfied` is a pure function of the observation. A
//! target that cannot be found is observed as [`Observation::Absent`], which
//! no condition accepts.

use crate::catalog::{is_resolved, GallerySpec, Locator};
use crate::error::HarvestError;
use crate::renderer::{locate_first, scripts, ReadyState, RenderContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot a condition computes from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// Nothing has been observed yet.
    NotEvaluated,
    /// The target is not in the document.
    Absent,
    Element { visible: bool },
    Count { loaded: usize },
    Attribute { value: Option<String> },
    Document { state: ReadyState },
    /// The lookup itself failed; counts as not ready.
    LookupFailed { message: String },
}

impl Observation {
    /// Loaded-item count, when this observation carries one.
    pub fn loaded_count(&self) -> Option<usize> {
        match self {
            Observation::Count { loaded } => Some(*loaded),
            _ => None,
        }
    }
}

/// A boolean condition over a rendering context.
#[async_trait]
pub trait ReadinessCondition: Send + Sync {
    /// Short label for logs.
    fn describe(&self) -> String;

    /// Read the page. Must not change it.
    async fn observe(&self, ctx: &dyn RenderContext) -> Result<Observation, HarvestError>;

    /// Judge an observation.
    fn is_satisfied(&self, observation: &Observation) -> bool;
}

// ── Element presence / visibility ────────────────────────────────────────────

async fn observe_element(
    ctx: &dyn RenderContext,
    locator: &Locator,
) -> Result<Observation, HarvestError> {
    Ok(match locate_first(ctx, locator).await? {
        Some(handle) => Observation::Element {
            visible: handle.visible,
        },
        None => Observation::Absent,
    })
}

/// Some alternative of the locator is in the document.
pub struct ElementPresent {
    pub locator: Locator,
}

impl ElementPresent {
    pub fn new(locator: Locator) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl ReadinessCondition for ElementPresent {
    fn describe(&self) -> String {
        format!("present({})", self.locator)
    }

    async fn observe(&self, ctx: &dyn RenderContext) -> Result<Observation, HarvestError> {
        observe_element(ctx, &self.locator).await
    }

    fn is_satisfied(&self, observation: &Observation) -> bool {
        matches!(observation, Observation::Element { .. })
    }
}

/// The first resolving alternative of the locator is rendered visibly.
pub struct ElementVisible {
    pub locator: Locator,
}

impl ElementVisible {
    pub fn new(locator: Locator) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl ReadinessCondition for ElementVisible {
    fn describe(&self) -> String {
        format!("visible({})", self.locator)
    }

    async fn observe(&self, ctx: &dyn RenderContext) -> Result<Observation, HarvestError> {
        observe_element(ctx, &self.locator).await
    }

    fn is_satisfied(&self, observation: &Observation) -> bool {
        matches!(observation, Observation::Element { visible: true })
    }
}

// ── Loaded item count ────────────────────────────────────────────────────────

/// At least `min_count` items inside the container carry a resolved,
/// non-placeholder reference.
pub struct MinItemsLoaded {
    /// `None` counts across the whole document.
    pub container: Option<Locator>,
    pub item_selector: String,
    pub reference_attributes: Vec<String>,
    pub placeholder_markers: Vec<String>,
    pub min_count: usize,
}

impl MinItemsLoaded {
    /// Count items the way `gallery` describes them.
    pub fn for_gallery(gallery: &GallerySpec, container: Option<Locator>, min_count: usize) -> Self {
        Self {
            container,
            item_selector: gallery.item_selector.clone(),
            reference_attributes: gallery.reference_attributes.clone(),
            placeholder_markers: gallery.placeholder_markers.clone(),
            min_count,
        }
    }

    fn args(&self, selector: Option<&str>) -> [Value; 4] {
        [
            selector.map(Value::from).unwrap_or(Value::Null),
            Value::from(self.item_selector.as_str()),
            Value::from(self.reference_attributes.clone()),
            Value::from(self.placeholder_markers.clone()),
        ]
    }
}

#[async_trait]
impl ReadinessCondition for MinItemsLoaded {
    fn describe(&self) -> String {
        match &self.container {
            Some(locator) => format!("min_items_loaded({locator}, {})", self.min_count),
            None => format!("min_items_loaded(document, {})", self.min_count),
        }
    }

    async fn observe(&self, ctx: &dyn RenderContext) -> Result<Observation, HarvestError> {
        let selectors: Vec<Option<&str>> = match &self.container {
            Some(locator) => locator.alternatives().iter().map(|s| Some(s.as_str())).collect(),
            None => vec![None],
        };
        for selector in selectors {
            let value = ctx
                .evaluate(scripts::COUNT_LOADED, &self.args(selector))
                .await?;
            if let Some(n) = value.as_u64() {
                return Ok(Observation::Count { loaded: n as usize });
            }
        }
        Ok(Observation::Absent)
    }

    fn is_satisfied(&self, observation: &Observation) -> bool {
        observation
            .loaded_count()
            .is_some_and(|loaded| loaded >= self.min_count)
    }
}

// ── Attribute resolution ─────────────────────────────────────────────────────

/// The attribute is non-empty and not a placeholder sentinel.
pub struct AttributeResolved {
    pub locator: Locator,
    pub attribute: String,
    pub placeholder_markers: Vec<String>,
}

impl AttributeResolved {
    pub fn new(locator: Locator, attribute: impl Into<String>, placeholder_markers: Vec<String>) -> Self {
        Self {
            locator,
            attribute: attribute.into(),
            placeholder_markers,
        }
    }
}

#[async_trait]
impl ReadinessCondition for AttributeResolved {
    fn describe(&self) -> String {
        format!("attribute_resolved({}, {})", self.locator, self.attribute)
    }

    async fn observe(&self, ctx: &dyn RenderContext) -> Result<Observation, HarvestError> {
        let value = ctx
            .evaluate(
                scripts::READ_ATTRIBUTE,
                &[self.locator.to_json(), Value::from(self.attribute.as_str())],
            )
            .await?;
        let found = value.get("found").and_then(Value::as_bool).unwrap_or(false);
        if !found {
            return Ok(Observation::Absent);
        }
        Ok(Observation::Attribute {
            value: value.get("value").and_then(Value::as_str).map(str::to_string),
        })
    }

    fn is_satisfied(&self, observation: &Observation) -> bool {
        match observation {
            Observation::Attribute { value: Some(v) } => is_resolved(v, &self.placeholder_markers),
            _ => false,
        }
    }
}

// ── Document ready ───────────────────────────────────────────────────────────

/// `document.readyState` is `complete`.
pub struct DocumentReady;

#[async_trait]
impl ReadinessCondition for DocumentReady {
    fn describe(&self) -> String {
        "document_ready".to_string()
    }

    async fn observe(&self, ctx: &dyn RenderContext) -> Result<Observation, HarvestError> {
        Ok(Observation::Document {
            state: ctx.ready_state().await?,
        })
    }

    fn is_satisfied(&self, observation: &Observation) -> bool {
        matches!(
            observation,
            Observation::Document {
                state: ReadyState::Complete
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["placeholder".to_string()]
    }

    #[test]
    fn test_absent_never_satisfies() {
        let loc = Locator::css("ul.wall");
        let conditions: Vec<Box<dyn ReadinessCondition>> = vec![
            Box::new(ElementPresent::new(loc.clone())),
            Box::new(ElementVisible::new(loc.clone())),
            Box::new(AttributeResolved::new(loc.clone(), "src", markers())),
            Box::new(MinItemsLoaded {
                container: Some(loc),
                item_selector: "img".into(),
                reference_attributes: vec!["src".into()],
                placeholder_markers: markers(),
                min_count: 0,
            }),
            Box::new(DocumentReady),
        ];
        for c in &conditions {
            assert!(!c.is_satisfied(&Observation::Absent), "{}", c.describe());
            assert!(!c.is_satisfied(&Observation::LookupFailed {
                message: "boom".into()
            }));
        }
    }

    #[test]
    fn test_visible_requires_visible_flag() {
        let c = ElementVisible::new(Locator::css("h1"));
        assert!(!c.is_satisfied(&Observation::Element { visible: false }));
        assert!(c.is_satisfied(&Observation::Element { visible: true }));
        let p = ElementPresent::new(Locator::css("h1"));
        assert!(p.is_satisfied(&Observation::Element { visible: false }));
    }

    #[test]
    fn test_min_items_threshold() {
        let c = MinItemsLoaded {
            container: None,
            item_selector: "img".into(),
            reference_attributes: vec!["src".into()],
            placeholder_markers: markers(),
            min_count: 5,
        };
        assert!(!c.is_satisfied(&Observation::Count { loaded: 4 }));
        assert!(c.is_satisfied(&Observation::Count { loaded: 5 }));
        assert_eq!(c.describe(), "min_items_loaded(document, 5)");
    }

    #[test]
    fn test_attribute_placeholder_is_not_resolved() {
        let c = AttributeResolved::new(Locator::css("img.hero"), "src", markers());
        assert!(!c.is_satisfied(&Observation::Attribute { value: None }));
        assert!(!c.is_satisfied(&Observation::Attribute {
            value: Some("https://cdn/placeholder.svg".into())
        }));
        assert!(c.is_satisfied(&Observation::Attribute {
            value: Some("https://cdn/a.jpg".into())
        }));
    }
}
