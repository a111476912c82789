//! Observation orchestration.
//!
//! One [`driver`] instance owns one live query: initial fetch, change
//! subscription, serialized re-query, and cleanup.

mod driver;

pub use driver::{ObservationDriver, ObservationState};
