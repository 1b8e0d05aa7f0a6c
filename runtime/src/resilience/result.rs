//! The harvest result and its completeness score.

use crate::discovery::{DiscoveredItem, DiscoveryReport};
use crate::error::{ErrorKind, FieldError, CONTEXT_FIELD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything one harvest produced, including what went wrong.
///
/// Built once per harvest and not changed after it is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The requested URL. Always set.
    pub source_url: String,
    pub harvested_at: DateTime<Utc>,
    pub required_fields: BTreeMap<String, Option<String>>,
    pub optional_fields: BTreeMap<String, Option<String>>,
    /// Discovered items in first-seen order.
    pub items: Vec<DiscoveredItem>,
    pub errors: Vec<FieldError>,
    pub completeness: f64,
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryReport>,
}

impl ExtractionResult {
    /// An empty result for `url`: no fields, no items, completeness 0.
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            source_url: url.into(),
            harvested_at: Utc::now(),
            required_fields: BTreeMap::new(),
            optional_fields: BTreeMap::new(),
            items: Vec::new(),
            errors: Vec::new(),
            completeness: 0.0,
            partial: true,
            discovery: None,
        }
    }

    /// The result for a context that could not be reached at all.
    pub fn unavailable(url: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::empty(url);
        result
            .errors
            .push(FieldError::new(CONTEXT_FIELD, ErrorKind::Unavailable, message));
        result
    }

    /// Whether the harvest ended because the rendering context was gone.
    pub fn is_unavailable(&self) -> bool {
        self.errors.iter().any(|e| e.cause == ErrorKind::Unavailable)
    }

    /// Whether any error was recorded against `field`.
    pub fn has_error_for(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Set `completeness` and `partial` from the fields, items and errors
    /// recorded so far.
    pub fn finalize(&mut self, items_field: Option<&str>) {
        let errored = |name: &str| self.has_error_for(name);
        let required: Vec<bool> = self
            .required_fields
            .iter()
            .map(|(name, value)| value.is_some() && !errored(name))
            .collect();
        let mut optional: Vec<bool> = self
            .optional_fields
            .iter()
            .map(|(name, value)| value.is_some() && !errored(name))
            .collect();
        if let Some(field) = items_field {
            optional.push(!self.items.is_empty() && !errored(field));
        }
        self.completeness = compute_completeness(&required, &optional);
        self.partial = self.completeness < 1.0;
    }
}

/// Completeness over presence flags.
///
/// Any missing required field gates the score to 0. Otherwise it is the
/// share of present fields among all required and optional ones. With no
/// fields at all the score is 1.
pub fn compute_completeness(required: &[bool], optional: &[bool]) -> f64 {
    if required.iter().any(|present| !present) {
        return 0.0;
    }
    let total = required.len() + optional.len();
    if total == 0 {
        return 1.0;
    }
    let present = required.len() + optional.iter().filter(|p| **p).count();
    present as f64 / total as f64
}
