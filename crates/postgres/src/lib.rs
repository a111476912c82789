//! Trigger + channel-notify change notifier for PostgreSQL.
//!
//! Each watched table gets a row-level trigger that publishes the operation
//! type on a table-derived `NOTIFY` channel. The notifier holds one dedicated
//! long-lived connection, issues `LISTEN` on that channel, and drains async
//! notifications on a background loop until cancelled.
//!
//! Trigger provisioning is idempotent (drop-if-exists, then create). When the
//! connecting role lacks the privilege to create triggers, provisioning logs
//! a warning and assumes the trigger was created manually, rather than
//! failing the observation.

mod ddl;
mod notifier;

pub use notifier::{PostgresChangeNotifier, PostgresListenOptions};
