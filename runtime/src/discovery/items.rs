//! Discovered items, their identity keys and the deduplicating set.

use crate::catalog::GallerySpec;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;
use url::Url;

/// One discovered item. Its `key` is unique within a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub reference: String,
    pub key: String,
    /// Step after which the item was first seen (0 = before any step).
    pub first_seen_step: usize,
}

/// Reference filtering and identity derivation for one gallery.
#[derive(Debug, Clone)]
pub struct ItemFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    min_length: usize,
    identity: Option<Regex>,
}

impl ItemFilter {
    pub fn from_gallery(gallery: &GallerySpec) -> Self {
        let identity = gallery.identity_pattern.as_deref().and_then(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = p, "ignoring invalid identity pattern: {e}");
                None
            }
        });
        Self {
            include: gallery.include.clone(),
            exclude: gallery.exclude.clone(),
            min_length: gallery.min_reference_length,
            identity,
        }
    }

    /// Whether a reference is kept at all.
    pub fn accepts(&self, reference: &str) -> bool {
        reference.len() >= self.min_length
            && self.include.iter().all(|s| reference.contains(s.as_str()))
            && !self.exclude.iter().any(|s| reference.contains(s.as_str()))
    }

    /// Identity key: the identity pattern's first capture when it matches,
    /// otherwise the reference without query or fragment.
    pub fn identity_key(&self, reference: &str) -> String {
        if let Some(key) = self
            .identity
            .as_ref()
            .and_then(|re| re.captures(reference))
            .and_then(|caps| caps.get(1))
        {
            return key.as_str().to_string();
        }
        match Url::parse(reference) {
            Ok(mut url) => {
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => reference.to_string(),
        }
    }
}

/// Insertion-ordered set of items, unique by identity key.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredSet {
    items: Vec<DiscoveredItem>,
    seen: HashSet<String>,
}

impl DiscoveredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of references observed after `step`. Returns how many
    /// were new. Re-merging the same batch adds nothing.
    pub fn merge<I, S>(&mut self, references: I, filter: &ItemFilter, step: usize) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.items.len();
        for reference in references {
            let reference = reference.into();
            if !filter.accepts(&reference) {
                continue;
            }
            let key = filter.identity_key(&reference);
            if self.seen.insert(key.clone()) {
                self.items.push(DiscoveredItem {
                    reference,
                    key,
                    first_seen_step: step,
                });
            }
        }
        self.items.len() - before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[DiscoveredItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<DiscoveredItem> {
        self.items
    }
}
