//! Diesel unit-of-work adapter.
//!
//! Repositories record which tables their statements touch in a
//! [`TransactionLog`]; the wrapper captures the distinct set through the
//! commit interceptor *before* diesel issues the commit, and the change
//! tracker is notified only when the commit actually succeeded.

use diesel::connection::Connection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;

use tablestream_core::commit::{CommitInterceptor, PendingChange};

/// r2d2-backed SQLite connection pool.
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// One pooled SQLite connection.
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Builds a connection pool for `database_url`.
pub fn create_pool(database_url: &str) -> Result<DbPool, r2d2::Error> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder().build(manager)
}

/// Collects the pending entity changes of one open transaction.
#[derive(Default)]
pub struct TransactionLog {
    changes: Vec<PendingChange>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inserted(&mut self, table: impl Into<String>) {
        self.changes.push(PendingChange::insert(table));
    }

    pub fn updated(&mut self, table: impl Into<String>) {
        self.changes.push(PendingChange::update(table));
    }

    pub fn deleted(&mut self, table: impl Into<String>) {
        self.changes.push(PendingChange::delete(table));
    }

    pub fn record(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }
}

/// Runs `f` inside a diesel transaction with commit interception.
///
/// Touched tables are captured before the commit (metadata for deleted rows
/// is gone afterward); the tracker is notified once per distinct table after
/// a successful commit, and not at all when the transaction rolls back.
pub fn observed_transaction<T, E, F>(
    connection: &mut SqliteConnection,
    interceptor: &CommitInterceptor,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(&mut SqliteConnection, &mut TransactionLog) -> Result<T, E>,
    E: From<diesel::result::Error>,
{
    let mut log = TransactionLog::new();
    let result = connection.transaction(|conn| {
        let value = f(conn, &mut log)?;
        interceptor.capture(log.changes());
        Ok(value)
    });
    match &result {
        Ok(_) => interceptor.commit_succeeded(),
        Err(_) => interceptor.commit_failed(),
    }
    result
}
