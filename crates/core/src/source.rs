//! The query capability consumed by observation drivers.
//!
//! The ORM's query building and materialization is an external collaborator:
//! the engine only needs "run this query under this context, get rows" and a
//! matching unpaged count. Implementations typically wrap a repository or
//! query builder.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::keys::RowAccess;
use crate::table::TableRef;

/// Runs one filtered query and its matching count.
///
/// `fetch` must honor the context's paging and sorting so the returned rows
/// are the current page in order; `count` is the unpaged total for the same
/// filter. `table` is the identity observers correlate on.
#[async_trait]
pub trait QuerySource: Send + Sync {
    type Row: RowAccess + Clone + Send + Sync + 'static;

    async fn fetch(&self, context: &QueryContext) -> Result<Vec<Self::Row>>;

    async fn count(&self) -> Result<u64>;

    fn table(&self) -> TableRef;
}

/// In-memory source for tests: serves whatever rows were last stored.
pub struct MockQuerySource<T> {
    table: TableRef,
    rows: Arc<Mutex<Vec<T>>>,
    fail_next: Arc<Mutex<Option<String>>>,
}

impl<T: Clone> MockQuerySource<T> {
    pub fn new(table: TableRef, rows: Vec<T>) -> Self {
        Self {
            table,
            rows: Arc::new(Mutex::new(rows)),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Replaces the served rows, simulating a write to the underlying table.
    pub fn set_rows(&self, rows: Vec<T>) {
        *self.rows.lock().unwrap() = rows;
    }

    /// Makes the next fetch fail with `message`.
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some(message.into());
    }
}

#[async_trait]
impl<T> QuerySource for MockQuerySource<T>
where
    T: RowAccess + Clone + Send + Sync + 'static,
{
    type Row = T;

    async fn fetch(&self, _context: &QueryContext) -> Result<Vec<T>> {
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(crate::errors::Error::Query(message));
        }
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    fn table(&self) -> TableRef {
        self.table.clone()
    }
}
