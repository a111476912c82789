//! The backend-agnostic change-notifier contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::Result;
use crate::table::TableRef;

/// Minimum quiet interval between `on_changed` invocations.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Callback invoked when the watched table changed.
///
/// May be invoked from a thread or context the caller does not own (a driver
/// connection task, a native callback thread); it must be cheap and must not
/// block.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// What a notifier should watch.
#[derive(Clone, Debug)]
pub struct ListenRequest {
    pub table: TableRef,
    /// Columns of interest. Backends that register column-limited
    /// subscriptions require a non-empty list; channel and hook backends
    /// ignore it.
    pub columns: Vec<String>,
}

impl ListenRequest {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Converts one backend's write notifications into debounced "this table
/// changed" callbacks.
///
/// Behavioral contract shared by all implementations:
///
/// - `on_changed` invocations are debounced: a burst of near-simultaneous
///   writes collapses into one trigger
/// - transient setup failures are retried with capped backoff instead of
///   permanently failing the observation
/// - `stop_listening` is safe to call repeatedly and never errors
/// - cancelling the `cancel` signal terminates the listen loop within the
///   next debounce/poll interval
/// - no backend-specific error type escapes this interface
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Starts watching per `request`, invoking `on_changed` after each
    /// (debounced) change until cancelled or stopped.
    async fn start_listening(
        &self,
        request: ListenRequest,
        on_changed: ChangeCallback,
        cancel: watch::Receiver<bool>,
    ) -> Result<()>;

    /// Stops watching and releases the backend session.
    async fn stop_listening(&self);
}
