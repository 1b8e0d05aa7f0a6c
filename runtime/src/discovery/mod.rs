//! Progressive discovery of lazily revealed items.
//!
//! The engine repeats reveal → wait → extract → stability check until the
//! discovered count settles above a minimum or a budget runs out. Items are
//! deduplicated by identity key and keep the order they were first seen in.

pub mod engine;
pub mod items;
pub mod stability;

pub use engine::{DiscoveryEngine, DiscoveryOutcome, DiscoveryReport, DiscoveryState, Termination};
pub use items::{DiscoveredItem, DiscoveredSet, ItemFilter};
pub use stability::StabilityTracker;
