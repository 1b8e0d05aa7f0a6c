//! Readiness: conditions over rendered state and the bounded poller that
//! waits on them instead of fixed sleeps.

pub mod poller;
pub mod predicates;

pub use poller::{poll, PollResult};
pub use predicates::{
    AttributeResolved, DocumentReady, ElementPresent, ElementVisible, MinItemsLoaded,
    Observation, ReadinessCondition,
};
