// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest event bus: typed events from every stage.
//!
//! The EventBus is a `tokio::sync::broadcast` channel carrying
//! [`HarvestEvent`] values. Any consumer (CLI event stream, test, log sink)
//! can subscribe independently. With no subscribers, events are dropped.

use crate::discovery::Termination;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the harvester emits. Serialized to JSON for streaming.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    // ── Lifecycle ─────────────────────────
    /// A harvest has started.
    HarvestStarted { url: String, deadline_ms: u64 },
    /// Navigation finished (after any retries).
    Navigated {
        url: String,
        final_url: String,
        attempts: u32,
        load_time_ms: u64,
    },
    /// The batch field lookup completed.
    FieldsExtracted {
        url: String,
        present: usize,
        total: usize,
    },

    // ── Discovery ─────────────────────────
    /// The primary region was missing; the whole document is used instead.
    RegionFallback {
        url: String,
        locator: String,
        max_steps: usize,
    },
    /// One reveal step was issued.
    StepApplied {
        url: String,
        index: usize,
        action: String,
        target_offset: f64,
        content_ready: bool,
    },
    /// Extraction after a step merged new items.
    ItemsMerged {
        url: String,
        step: usize,
        added: usize,
        total: usize,
    },
    /// The discovery loop reached `Done`.
    DiscoveryFinished {
        url: String,
        items: usize,
        steps_applied: usize,
        termination: Termination,
        elapsed_ms: u64,
    },

    // ── Result ────────────────────────────
    /// A harvest returned its result.
    HarvestFinished {
        url: String,
        completeness: f64,
        partial: bool,
        errors: usize,
        elapsed_ms: u64,
    },
}

impl HarvestEvent {
    /// The page URL this event belongs to.
    pub fn url(&self) -> &str {
        match self {
            HarvestEvent::HarvestStarted { url, .. }
            | HarvestEvent::Navigated { url, .. }
            | HarvestEvent::FieldsExtracted { url, .. }
            | HarvestEvent::RegionFallback { url, .. }
            | HarvestEvent::StepApplied { url, .. }
            | HarvestEvent::ItemsMerged { url, .. }
            | HarvestEvent::DiscoveryFinished { url, .. }
            | HarvestEvent::HarvestFinished { url, .. } => url,
        }
    }
}

/// The event bus shared by concurrent harvests.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HarvestEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Emit through an optional bus.
pub(crate) fn emit(bus: Option<&EventBus>, event: impl FnOnce() -> HarvestEvent) {
    if let Some(bus) = bus {
        bus.emit(event());
    }
}
