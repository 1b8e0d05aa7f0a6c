//! Declarative selector catalog: which fields to read and where the
//! lazily loaded gallery lives.
//!
//! The catalog is read-only configuration. It is shared between concurrent
//! harvests and never mutated by them. The default listing catalog is
//! embedded at compile time from `listing.json`.

use crate::error::HarvestError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Raw JSON for the built-in listing catalog.
const LISTING_JSON: &str = include_str!("listing.json");

// ── Locators ─────────────────────────────────────────────────────────────────

/// Ordered CSS selector alternatives. The first one that resolves wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator {
    alternatives: Vec<String>,
}

impl Locator {
    /// A locator with a single selector.
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            alternatives: vec![selector.into()],
        }
    }

    /// A locator that tries each selector in order.
    pub fn any<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            alternatives: selectors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Selector list as a JSON argument for page scripts.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.alternatives.clone())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.alternatives.join(" | "))
    }
}

// ── Field specs ──────────────────────────────────────────────────────────────

/// Where a field's raw value comes from on the matched element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Trimmed `textContent`.
    #[default]
    Text,
    /// Value of the named attribute.
    Attribute(String),
}

/// One post-processing step applied to a resolved raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PostProcess {
    Trim,
    /// Keep only the given capture group of the first regex match.
    Capture {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
    },
    Prefix {
        text: String,
    },
    Suffix {
        text: String,
    },
}

fn default_group() -> usize {
    1
}

/// A named lookup: locator plus optional post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub locator: Locator,
    #[serde(default)]
    pub source: FieldSource,
    /// Read the n-th match instead of the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Required fields gate the validity of the whole result.
    #[serde(default)]
    pub required: bool,
    /// Raw values shorter than this are treated as absent.
    #[serde(default)]
    pub min_length: usize,
    #[serde(default)]
    pub post: Vec<PostProcess>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
            source: FieldSource::Text,
            index: None,
            required: false,
            min_length: 0,
            post: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_post(mut self, step: PostProcess) -> Self {
        self.post.push(step);
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Run the post-processing chain over a resolved raw value.
    ///
    /// Never retried by callers: a malformed value stays malformed.
    pub fn parse(&self, raw: &str) -> Result<String, HarvestError> {
        let mut value = raw.to_string();
        for step in &self.post {
            value = match step {
                PostProcess::Trim => value.trim().to_string(),
                PostProcess::Prefix { text } => format!("{text}{value}"),
                PostProcess::Suffix { text } => format!("{value}{text}"),
                PostProcess::Capture { pattern, group } => {
                    let re = Regex::new(pattern).map_err(|e| self.parse_failure(raw, e.to_string()))?;
                    let caps = re
                        .captures(&value)
                        .ok_or_else(|| self.parse_failure(raw, format!("no match for /{pattern}/")))?;
                    caps.get(*group)
                        .map(|m| m.as_str().to_string())
                        .ok_or_else(|| self.parse_failure(raw, format!("group {group} did not participate")))?
                }
            };
        }
        if value.is_empty() {
            return Err(self.parse_failure(raw, "empty after post-processing".to_string()));
        }
        Ok(value)
    }

    fn parse_failure(&self, raw: &str, reason: String) -> HarvestError {
        HarvestError::ParseFailure {
            field: self.name.clone(),
            value: raw.to_string(),
            reason,
        }
    }
}

// ── Gallery ──────────────────────────────────────────────────────────────────

/// Where the lazily revealed media collection lives and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GallerySpec {
    /// Name the item collection is reported under.
    #[serde(default = "default_items_field")]
    pub field: String,
    /// Button that opens the full gallery. Clicked once, if present.
    #[serde(default)]
    pub trigger: Locator,
    /// The scrollable region holding the items.
    pub container: Locator,
    #[serde(default = "default_item_selector")]
    pub item_selector: String,
    /// First non-empty attribute is the item's reference.
    #[serde(default = "default_reference_attributes")]
    pub reference_attributes: Vec<String>,
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,
    /// Every substring must occur in a kept reference.
    #[serde(default)]
    pub include: Vec<String>,
    /// No substring may occur in a kept reference.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub min_reference_length: usize,
    /// Regex whose first capture group is the identity key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_pattern: Option<String>,
}

fn default_items_field() -> String {
    "images".to_string()
}

fn default_item_selector() -> String {
    "img".to_string()
}

fn default_reference_attributes() -> Vec<String> {
    vec!["src".into(), "data-src".into(), "data-lazy-src".into()]
}

fn default_placeholder_markers() -> Vec<String> {
    vec![
        "placeholder".into(),
        "data:image".into(),
        "about:blank".into(),
    ]
}

impl GallerySpec {
    /// A gallery with default item handling inside `container`.
    pub fn new(container: Locator) -> Self {
        Self {
            field: default_items_field(),
            trigger: Locator::default(),
            container,
            item_selector: default_item_selector(),
            reference_attributes: default_reference_attributes(),
            placeholder_markers: default_placeholder_markers(),
            include: Vec::new(),
            exclude: Vec::new(),
            min_reference_length: 0,
            identity_pattern: None,
        }
    }
}

/// True when `value` is non-empty and carries none of the placeholder markers.
pub fn is_resolved(value: &str, placeholder_markers: &[String]) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_ascii_lowercase();
    !placeholder_markers
        .iter()
        .any(|m| lower.contains(&m.to_ascii_lowercase()))
}

// ── Catalog ──────────────────────────────────────────────────────────────────

/// Everything site-specific a harvest needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCatalog {
    /// Element whose presence marks the page as initially rendered.
    #[serde(default)]
    pub ready: Locator,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery: Option<GallerySpec>,
}

impl SelectorCatalog {
    /// The built-in listing catalog, parsed.
    pub fn try_listing() -> Result<Self, serde_json::Error> {
        serde_json::from_str(LISTING_JSON)
    }

    /// The built-in listing catalog, or an empty one if it does not parse.
    pub fn listing() -> Self {
        Self::try_listing().unwrap_or_else(|e| {
            tracing::error!("built-in listing catalog is malformed: {e}");
            Self::default()
        })
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.required)
    }

    /// Reject catalogs that would fail on every page.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.locator.is_empty() {
                return Err(format!("field '{}' has no selectors", field.name));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("duplicate field name '{}'", field.name));
            }
            for step in &field.post {
                if let PostProcess::Capture { pattern, .. } = step {
                    Regex::new(pattern)
                        .map_err(|e| format!("field '{}': bad pattern: {e}", field.name))?;
                }
            }
        }
        if let Some(gallery) = &self.gallery {
            if seen.contains(gallery.field.as_str()) {
                return Err(format!(
                    "gallery field '{}' collides with a field spec",
                    gallery.field
                ));
            }
            if gallery.reference_attributes.is_empty() {
                return Err("gallery needs at least one reference attribute".into());
            }
            if let Some(pattern) = &gallery.identity_pattern {
                Regex::new(pattern).map_err(|e| format!("bad identity pattern: {e}"))?;
            }
        }
        Ok(())
    }
}
