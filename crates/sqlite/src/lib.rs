//! SQLite integration: native update-hook change notifier and the diesel
//! unit-of-work adapter.
//!
//! - [`notifier`] - converts SQLite's per-connection update hook into the
//!   uniform [`ChangeNotifier`](tablestream_core::ChangeNotifier) contract
//! - [`uow`] - wraps diesel transactions so touched tables are captured
//!   before commit and the change tracker is notified after a successful
//!   commit

pub mod notifier;
pub mod uow;

pub use notifier::{SqliteHookNotifier, SqliteHookOptions};
pub use uow::{create_pool, observed_transaction, DbConnection, DbPool, TransactionLog};
