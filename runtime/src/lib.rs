// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvester runtime library: progressive harvesting of lazily rendered
//! pages.
//!
//! A harvest navigates a rendering context, waits for readiness with bounded
//! polls instead of fixed sleeps, extracts the page's fields in one round
//! trip, then reveals and deduplicates lazily loaded items until their count
//! stabilises. The result is always returned, scored for completeness.

pub mod batch;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod extract;
pub mod readiness;
pub mod renderer;
pub mod resilience;
pub mod reveal;

pub use config::HarvestConfig;
pub use error::{ErrorKind, FieldError, HarvestError};
pub use resilience::{harvest, ExtractionResult, Harvester};
