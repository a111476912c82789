//! The SQLite update-hook change notifier.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::hooks::Action;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tablestream_core::errors::{NotifierError, Result};
use tablestream_core::notify::{
    Backoff, ChangeCallback, ChangeNotifier, Debouncer, ListenRequest, DEFAULT_DEBOUNCE,
};

/// Configuration for [`SqliteHookNotifier`].
#[derive(Clone, Debug)]
pub struct SqliteHookOptions {
    debounce: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl Default for SqliteHookOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteHookOptions {
    pub fn new() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(10),
        }
    }

    pub fn debounce(mut self, interval: Duration) -> Self {
        self.debounce = interval;
        self
    }

    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }
}

enum HookTarget {
    /// Open a dedicated connection to this database on start.
    Database(PathBuf),
    /// Observe an existing connection, typically the application's write
    /// connection (the hook only sees writes made through its own
    /// connection).
    Connection(Arc<Mutex<Connection>>),
}

struct HookState {
    /// Held for the whole registration: the connection owns the registered
    /// callback, and dropping the connection while the hook is installed
    /// would tear the callback down mid-registration.
    connection: Arc<Mutex<Connection>>,
    worker: JoinHandle<()>,
}

/// Converts SQLite's native update hook into debounced change callbacks.
///
/// The hook fires synchronously inside the driver on every insert, update,
/// and delete row operation for the hooked connection. The callback filters
/// to the watched table and forwards onto a worker task over a channel;
/// debouncing and `on_changed` dispatch happen on the worker, never on the
/// native call stack.
pub struct SqliteHookNotifier {
    options: SqliteHookOptions,
    target: HookTarget,
    state: Mutex<Option<HookState>>,
}

impl SqliteHookNotifier {
    /// Watches `path`, opening a dedicated connection on start.
    pub fn for_database(path: impl Into<PathBuf>, options: SqliteHookOptions) -> Self {
        Self {
            options,
            target: HookTarget::Database(path.into()),
            state: Mutex::new(None),
        }
    }

    /// Watches writes made through `connection`.
    pub fn for_connection(connection: Arc<Mutex<Connection>>, options: SqliteHookOptions) -> Self {
        Self {
            options,
            target: HookTarget::Connection(connection),
            state: Mutex::new(None),
        }
    }

    /// Opens the dedicated connection, retrying transient failures with
    /// capped backoff until cancelled.
    async fn acquire_connection(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> std::result::Result<Option<Arc<Mutex<Connection>>>, NotifierError> {
        match &self.target {
            HookTarget::Connection(shared) => Ok(Some(Arc::clone(shared))),
            HookTarget::Database(path) => {
                let mut backoff =
                    Backoff::exponential(self.options.backoff_base, self.options.backoff_cap);
                loop {
                    match Connection::open(path) {
                        Ok(connection) => {
                            return Ok(Some(Arc::new(Mutex::new(connection))));
                        }
                        Err(error) => {
                            let delay = backoff.next_delay();
                            warn!(
                                "Could not open {} for change hooks: {}; retrying in {:?}",
                                path.display(),
                                error,
                                delay
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = cancel.wait_for(|stop| *stop) => return Ok(None),
                            }
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChangeNotifier for SqliteHookNotifier {
    async fn start_listening(
        &self,
        request: ListenRequest,
        on_changed: ChangeCallback,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        // Starting again replaces any previous registration.
        self.stop_listening().await;

        let connection = match self.acquire_connection(&mut cancel).await? {
            Some(connection) => connection,
            // Cancelled while retrying: expected termination.
            None => return Ok(()),
        };

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
        let target_table = request.table.table().to_string();
        {
            let guard = connection.lock().unwrap();
            // The hook runs synchronously inside the driver on whatever
            // thread performed the write: filter, forward, return.
            guard.update_hook(Some(
                move |_action: Action, _db: &str, table: &str, _rowid: i64| {
                    if table == target_table {
                        let _ = event_tx.send(());
                    }
                },
            ));
        }

        let debouncer = Debouncer::new(self.options.debounce);
        let table = request.table.clone();
        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = event_rx.recv() => match received {
                        Some(()) => {
                            if debouncer.accept() {
                                on_changed();
                            }
                        }
                        None => break,
                    },
                    _ = cancel.wait_for(|stop| *stop) => break,
                }
            }
            debug!("Update-hook worker for {} ended", table);
        });

        *self.state.lock().unwrap() = Some(HookState { connection, worker });
        Ok(())
    }

    async fn stop_listening(&self) {
        let state = self.state.lock().unwrap().take();
        if let Some(state) = state {
            // Unregister by installing a null callback before the connection
            // goes away; dropping the old closure also closes the event
            // channel, which winds the worker down.
            {
                let guard = state.connection.lock().unwrap();
                guard.update_hook(None::<fn(Action, &str, &str, i64)>);
            }
            if state.worker.await.is_err() {
                warn!("Update-hook worker ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tablestream_core::table::TableRef;

    fn shared_connection(path: &std::path::Path) -> Arc<Mutex<Connection>> {
        let connection = Connection::open(path).unwrap();
        connection
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT);
                 CREATE TABLE IF NOT EXISTS accounts (id INTEGER PRIMARY KEY, owner TEXT);",
            )
            .unwrap();
        Arc::new(Mutex::new(connection))
    }

    fn counting_callback() -> (ChangeCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            Arc::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test]
    async fn test_hook_fires_for_the_watched_table_only() {
        let dir = tempfile::tempdir().unwrap();
        let connection = shared_connection(&dir.path().join("app.db"));

        let notifier = SqliteHookNotifier::for_connection(
            Arc::clone(&connection),
            SqliteHookOptions::new().debounce(Duration::from_millis(1)),
        );
        let (callback, fired) = counting_callback();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        notifier
            .start_listening(
                ListenRequest::new(TableRef::new("users")),
                callback,
                cancel_rx,
            )
            .await
            .unwrap();

        // A write to a different table must not reach the observer.
        connection
            .lock()
            .unwrap()
            .execute("INSERT INTO accounts (owner) VALUES ('a')", [])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        connection
            .lock()
            .unwrap()
            .execute("INSERT INTO users (name) VALUES ('n')", [])
            .unwrap();
        let observed = Arc::clone(&fired);
        wait_until(move || observed.load(Ordering::SeqCst) == 1).await;

        notifier.stop_listening().await;
    }

    #[tokio::test]
    async fn test_write_burst_collapses_into_one_callback() {
        let dir = tempfile::tempdir().unwrap();
        let connection = shared_connection(&dir.path().join("app.db"));

        let notifier = SqliteHookNotifier::for_connection(
            Arc::clone(&connection),
            SqliteHookOptions::new().debounce(Duration::from_secs(60)),
        );
        let (callback, fired) = counting_callback();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        notifier
            .start_listening(
                ListenRequest::new(TableRef::new("users")),
                callback,
                cancel_rx,
            )
            .await
            .unwrap();

        {
            let guard = connection.lock().unwrap();
            for i in 0..3 {
                guard
                    .execute("INSERT INTO users (name) VALUES (?1)", [format!("u{}", i)])
                    .unwrap();
            }
        }

        let observed = Arc::clone(&fired);
        wait_until(move || observed.load(Ordering::SeqCst) >= 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        notifier.stop_listening().await;
    }

    #[tokio::test]
    async fn test_stop_clears_the_hook() {
        let dir = tempfile::tempdir().unwrap();
        let connection = shared_connection(&dir.path().join("app.db"));

        let notifier = SqliteHookNotifier::for_connection(
            Arc::clone(&connection),
            SqliteHookOptions::new().debounce(Duration::from_millis(1)),
        );
        let (callback, fired) = counting_callback();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        notifier
            .start_listening(
                ListenRequest::new(TableRef::new("users")),
                callback,
                cancel_rx,
            )
            .await
            .unwrap();

        notifier.stop_listening().await;
        notifier.stop_listening().await;

        connection
            .lock()
            .unwrap()
            .execute("INSERT INTO users (name) VALUES ('late')", [])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dedicated_connection_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        drop(shared_connection(&path));

        let notifier = SqliteHookNotifier::for_database(&path, SqliteHookOptions::new());
        let (callback, _) = counting_callback();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        notifier
            .start_listening(
                ListenRequest::new(TableRef::new("users")),
                callback,
                cancel_rx,
            )
            .await
            .unwrap();
        notifier.stop_listening().await;
    }
}
