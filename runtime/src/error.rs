//! Error taxonomy shared by every harvest stage.
//!
//! Only [`ErrorKind::Unavailable`] is terminal. Everything else is recovered
//! locally and recorded as a [`FieldError`] on the result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a harvest failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A locator resolved to nothing.
    NotFound,
    /// Readiness was not reached within its budget.
    Timeout,
    /// Network or navigation hiccup; eligible for retry.
    Transient,
    /// The rendering context is gone or unreachable.
    Unavailable,
    /// A value was present but malformed.
    ParseFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::ParseFailure => "parse_failure",
        };
        f.write_str(s)
    }
}

/// All errors raised inside the harvester.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HarvestError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out after {elapsed_ms}ms waiting for {what}")]
    Timeout { what: String, elapsed_ms: u64 },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rendering context unavailable: {0}")]
    Unavailable(String),

    #[error("could not parse {field} from {value:?}: {reason}")]
    ParseFailure {
        field: String,
        value: String,
        reason: String,
    },
}

impl HarvestError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarvestError::NotFound(_) => ErrorKind::NotFound,
            HarvestError::Timeout { .. } => ErrorKind::Timeout,
            HarvestError::Transient(_) => ErrorKind::Transient,
            HarvestError::Unavailable(_) => ErrorKind::Unavailable,
            HarvestError::ParseFailure { .. } => ErrorKind::ParseFailure,
        }
    }

    /// Whether a retry policy may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarvestError::Transient(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, HarvestError::Unavailable(_))
    }
}

/// A failure attributed to one field (or to the item collection).
///
/// Appended to [`crate::resilience::ExtractionResult::errors`], never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name, the item collection name, or [`CONTEXT_FIELD`].
    pub field: String,
    /// Taxonomy bucket.
    pub cause: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// Pseudo-field used for failures that belong to the whole harvest.
pub const CONTEXT_FIELD: &str = "context";

impl FieldError {
    pub fn new(field: impl Into<String>, cause: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            cause,
            message: message.into(),
        }
    }

    /// Attribute an error to a field.
    pub fn from_error(field: impl Into<String>, err: &HarvestError) -> Self {
        Self::new(field, err.kind(), err.to_string())
    }
}
