//! Commit interception.
//!
//! The interceptor hooks the unit-of-work's commit lifecycle: it captures
//! which tables the pending transaction touches *before* commit (deleted
//! rows' metadata may be unavailable afterward) and notifies the change
//! tracker only *after* the commit succeeds. A failed commit fires nothing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::table::TableRef;
use crate::tracker::ChangeTracker;

/// The kind of row operation a pending change represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One pending entity change inside an open unit of work.
///
/// Carries the resolved table name rather than the entity itself so the
/// capture survives the entity becoming detached after commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingChange {
    pub op: ChangeOp,
    pub table: String,
    pub schema: Option<String>,
}

impl PendingChange {
    pub fn insert(table: impl Into<String>) -> Self {
        Self {
            op: ChangeOp::Insert,
            table: table.into(),
            schema: None,
        }
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self {
            op: ChangeOp::Update,
            table: table.into(),
            schema: None,
        }
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self {
            op: ChangeOp::Delete,
            table: table.into(),
            schema: None,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Resolves this change to a table identity, using the explicit schema
    /// when present and otherwise the unit of work's default schema.
    pub fn table_ref(&self, default_schema: Option<&str>) -> TableRef {
        match self.schema.as_deref().or(default_schema) {
            Some(schema) => TableRef::with_schema(schema, &self.table),
            None => TableRef::new(&self.table),
        }
    }
}

/// Captures touched tables before commit and notifies after success.
///
/// One interceptor serves one unit of work at a time; captured state is
/// cleared on both outcomes so nothing leaks into the next transaction.
pub struct CommitInterceptor {
    tracker: Arc<ChangeTracker>,
    default_schema: Option<String>,
    touched: Mutex<HashSet<TableRef>>,
}

impl CommitInterceptor {
    pub fn new(tracker: Arc<ChangeTracker>) -> Self {
        Self {
            tracker,
            default_schema: None,
            touched: Mutex::new(HashSet::new()),
        }
    }

    /// Uses `schema` for changes that do not declare one of their own.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Records the distinct set of tables touched by the pending changes.
    ///
    /// Must run before the commit is issued. A transaction touching zero
    /// tables is fine; it will simply fire zero notifications.
    pub fn capture<'a>(&self, changes: impl IntoIterator<Item = &'a PendingChange>) {
        let mut touched = self.touched.lock().unwrap();
        for change in changes {
            touched.insert(change.table_ref(self.default_schema.as_deref()));
        }
    }

    /// Fires one notification per captured table, then clears the capture.
    ///
    /// Call only after the commit actually succeeded.
    pub fn commit_succeeded(&self) {
        let touched = std::mem::take(&mut *self.touched.lock().unwrap());
        debug!("Commit touched {} table(s)", touched.len());
        for table in touched {
            self.tracker.notify(&table);
        }
    }

    /// Discards the capture without notifying anyone.
    pub fn commit_failed(&self) {
        self.touched.lock().unwrap().clear();
    }
}
