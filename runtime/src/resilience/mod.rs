//! Resilience layer: retries, per-field isolation and the partial result.

pub mod harvest;
pub mod result;
pub mod retry;

pub use harvest::{harvest, Harvester};
pub use result::{compute_completeness, ExtractionResult};
pub use retry::Retrier;
