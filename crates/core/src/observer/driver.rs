//! The observation driver.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::context::QueryContext;
use crate::errors::{Error, Result};
use crate::sink::ViewSink;
use crate::source::QuerySource;
use crate::tracker::{ChangeTracker, SubscriptionHandle};
use crate::window::WindowedSet;

/// Lifecycle of one observation. `Completed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationState {
    Starting,
    Watching,
    CleaningUp,
    Completed,
}

/// Orchestrates one live query.
///
/// Starting runs the initial query and count, seeds the windowed result set,
/// and pushes the first view. Watching re-queries on every tracker
/// notification, using the current query context, and pushes the refreshed
/// view. A failure transitions straight to cleanup; there are no retries at
/// this level.
///
/// Re-query is never re-entrant: the tracker callback only raises a wakeup
/// flag, and the single watch task coalesces flags raised during an
/// in-flight re-query into at most one follow-up.
pub struct ObservationDriver<S: QuerySource + 'static> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: QuerySource + 'static> {
    source: Arc<S>,
    sink: Arc<dyn ViewSink<S::Row>>,
    tracker: Arc<ChangeTracker>,
    context: Arc<QueryContext>,
    changed: Notify,
    cancel_tx: watch::Sender<bool>,
    state: Mutex<ObservationState>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: QuerySource + 'static> ObservationDriver<S> {
    /// Builds a driver for `source`, pushing views into `sink`.
    ///
    /// Fails fast when the query context violates the paging contract.
    pub fn new(
        source: Arc<S>,
        sink: Arc<dyn ViewSink<S::Row>>,
        tracker: Arc<ChangeTracker>,
        context: Arc<QueryContext>,
    ) -> Result<Self> {
        context.validate().map_err(Error::Setup)?;
        let (cancel_tx, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                source,
                sink,
                tracker,
                context,
                changed: Notify::new(),
                cancel_tx,
                state: Mutex::new(ObservationState::Starting),
                subscription: Mutex::new(None),
                watch_task: Mutex::new(None),
            }),
        })
    }

    /// Runs the initial query, pushes the first view, and begins watching.
    ///
    /// Call at most once per driver. On failure the sink receives the error
    /// signal, cleanup runs, and the error is returned to the caller.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let table = inner.source.table();
        debug!("Starting observation of {}", table);

        // Register before the initial query so a write landing in between
        // leaves a wakeup permit instead of being lost.
        let callback_inner = Arc::clone(inner);
        let handle = inner.tracker.register(table, move || {
            if !callback_inner.is_terminating() {
                callback_inner.changed.notify_one();
            }
        });
        *inner.subscription.lock().unwrap() = Some(handle);

        let mut window = match WindowedSet::new(Arc::clone(&inner.context)) {
            Ok(window) => window,
            Err(setup) => return self.fail(Error::Setup(setup)),
        };
        if let Err(error) = inner.refresh(&mut window).await {
            return self.fail(error);
        }

        {
            // A stop that raced the startup sequence wins; never resurrect a
            // cleaned-up observation.
            let mut state = inner.state.lock().unwrap();
            if *state != ObservationState::Starting {
                return Err(Error::Cancelled);
            }
            *state = ObservationState::Watching;
        }
        let loop_inner = Arc::clone(inner);
        let task = tokio::spawn(async move {
            loop_inner.watch_loop(window).await;
        });
        *inner.watch_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Cancels the observation and waits for cleanup to finish.
    ///
    /// Safe to call more than once; cancellation is expected termination,
    /// not an error.
    pub async fn stop(&self) {
        let _ = self.inner.cancel_tx.send(true);
        let task = self.inner.watch_task.lock().unwrap().take();
        if let Some(task) = task {
            if task.await.is_err() {
                warn!("Observation watch task ended abnormally");
            }
        }
        self.inner.cleanup();
    }

    pub fn state(&self) -> ObservationState {
        *self.inner.state.lock().unwrap()
    }

    fn fail(&self, error: Error) -> Result<()> {
        self.inner.sink.error(error.clone());
        self.inner.cleanup();
        Err(error)
    }
}

impl<S: QuerySource + 'static> Inner<S> {
    fn is_terminating(&self) -> bool {
        matches!(
            *self.state.lock().unwrap(),
            ObservationState::CleaningUp | ObservationState::Completed
        )
    }

    /// Re-runs the count and the filtered query under the current context,
    /// rebuilds the window, and pushes the materialized view.
    async fn refresh(&self, window: &mut WindowedSet<S::Row>) -> Result<()> {
        let total = self.source.count().await?;
        self.context.set_total_items(total);

        let rows = self.source.fetch(&self.context).await?;
        window.reinitialize(rows).map_err(Error::Setup)?;
        self.sink.next(window.to_view());
        Ok(())
    }

    async fn watch_loop(self: Arc<Self>, mut window: WindowedSet<S::Row>) {
        let mut cancel_rx = self.cancel_tx.subscribe();
        loop {
            tokio::select! {
                _ = self.changed.notified() => {
                    if let Err(error) = self.refresh(&mut window).await {
                        self.sink.error(error);
                        break;
                    }
                }
                _ = cancel_rx.changed() => {
                    debug!("Observation of {} cancelled", self.source.table());
                    break;
                }
            }
        }
        self.cleanup();
    }

    /// Unregisters the tracker callback and signals completion downstream.
    /// Idempotent: only the first invocation has effect.
    fn cleanup(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(
                *state,
                ObservationState::CleaningUp | ObservationState::Completed
            ) {
                return;
            }
            *state = ObservationState::CleaningUp;
        }

        if let Some(handle) = self.subscription.lock().unwrap().take() {
            handle.unregister();
        }
        let _ = self.cancel_tx.send(true);
        self.sink.complete();
        *self.state.lock().unwrap() = ObservationState::Completed;
    }
}
