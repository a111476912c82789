//! Tablestream Core - incremental query observation engine.
//!
//! This crate keeps a live, paged, sorted view of a relational query result
//! synchronized with an underlying table and streams the materialized view to
//! a subscriber. It is backend-agnostic and defines the traits that the
//! `tablestream-postgres`, `tablestream-subscription`, and
//! `tablestream-sqlite` crates implement.
//!
//! The moving parts, leaf first:
//!
//! - [`tracker`] - the process-wide table -> callback registry every notifier
//!   and observer goes through
//! - [`commit`] - captures the tables touched by a unit of work before commit
//!   and notifies the tracker after a successful commit
//! - [`window`] - the bounded, sorted, paged in-memory view of a query result
//! - [`observer`] - orchestrates one live query from initial fetch to cleanup
//! - [`notify`] - the uniform change-notifier contract plus debounce/backoff
//!   tooling shared by the backend crates
//! - [`source`] / [`sink`] - the query capability consumed upstream and the
//!   push-style delivery seam exposed downstream

pub mod commit;
pub mod context;
pub mod errors;
pub mod keys;
pub mod notify;
pub mod observer;
pub mod sink;
pub mod source;
pub mod table;
pub mod tracker;
pub mod window;

// Re-export the types most embedders touch
pub use commit::{ChangeOp, CommitInterceptor, PendingChange};
pub use context::{Paging, QueryContext, SortDirection, Sorting};
pub use errors::{Error, NotifierError, Result, SetupError};
pub use keys::{RowAccess, SortValue};
pub use notify::{Backoff, ChangeCallback, ChangeNotifier, Debouncer, ListenRequest};
pub use observer::{ObservationDriver, ObservationState};
pub use sink::{ChannelSink, MockViewSink, NoOpViewSink, SinkEvent, ViewSink};
pub use source::QuerySource;
pub use table::TableRef;
pub use tracker::{ChangeTracker, SubscriptionHandle};
pub use window::{WindowedSet, WindowedView};
