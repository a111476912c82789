//! One-shot dependency-subscription change notifier.
//!
//! Some backends deliver change notifications through query-notification
//! subscriptions that are inherently one-shot: every delivered notification
//! invalidates the subscription, which must be re-established before the next
//! change can be observed. This crate owns that re-arm choreography:
//!
//! - [`enablement`] - the process-wide, at-most-once broker enablement check
//! - [`driver`] - the session seam a concrete backend driver implements
//! - [`notifier`] - the supervising re-arm loop behind the uniform
//!   [`ChangeNotifier`](tablestream_core::ChangeNotifier) contract

pub mod driver;
pub mod enablement;
mod notifier;

pub use driver::{
    registration_query, DriverError, SessionOptions, SubscriptionDriver, SubscriptionNotice,
    SubscriptionSession,
};
pub use enablement::BrokerEnablement;
pub use notifier::{SubscriptionChangeNotifier, SubscriptionOptions};
