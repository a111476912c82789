//! The uniform change-notifier contract and its shared tooling.
//!
//! Each backend crate converts its database's notification primitive
//! (trigger + channel notify, one-shot dependency subscriptions, native
//! update hooks) into this one contract:
//!
//! - [`notifier`] - the `ChangeNotifier` trait and listen request
//! - [`debounce`] - collapses notification bursts into one trigger
//! - [`backoff`] - capped retry delays for transient setup failures

mod backoff;
mod debounce;
mod notifier;

pub use backoff::{Backoff, BackoffStrategy};
pub use debounce::Debouncer;
pub use notifier::{ChangeCallback, ChangeNotifier, ListenRequest, DEFAULT_DEBOUNCE};
