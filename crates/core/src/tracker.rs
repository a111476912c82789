//! Process-wide change tracker.
//!
//! The tracker is the single fan-out point between writers and observers: a
//! table-name -> set-of-callbacks registry. Notifiers and the commit
//! interceptor call [`ChangeTracker::notify`]; observation drivers register
//! callbacks and hold the returned [`SubscriptionHandle`] for the lifetime of
//! the observation.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::{error, trace};
use uuid::Uuid;

use crate::table::TableRef;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Table-keyed pub/sub registry for "this table changed" events.
///
/// Registration and notification are safe from any thread. Callbacks run
/// synchronously on the thread that delivered the notification (a database
/// driver thread, a native callback thread, or a pool thread), so they must
/// be cheap and must not block.
#[derive(Default)]
pub struct ChangeTracker {
    subscribers: DashMap<TableRef, HashMap<Uuid, Callback>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for changes to `table`.
    ///
    /// The returned handle removes exactly this callback when unregistered or
    /// dropped. Many callbacks may be registered per table; invocation order
    /// is unspecified.
    pub fn register(
        self: &Arc<Self>,
        table: TableRef,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        self.subscribers
            .entry(table.clone())
            .or_default()
            .insert(id, Arc::new(callback));
        trace!("Registered change callback {} for {}", id, table);
        SubscriptionHandle {
            tracker: Arc::clone(self),
            table,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Invokes every callback currently registered for `table`.
    ///
    /// Runs synchronously on the calling thread. Each invocation is isolated
    /// in its own panic boundary: a panicking observer is logged and skipped,
    /// the remaining callbacks still fire. Notifying a table with no
    /// subscribers is a no-op.
    pub fn notify(&self, table: &TableRef) {
        // Clone the callbacks out before invoking so a callback that
        // registers or unregisters does not deadlock on the shard lock.
        let callbacks: Vec<Callback> = match self.subscribers.get(table) {
            Some(entry) => entry.values().cloned().collect(),
            None => return,
        };

        trace!("Notifying {} subscriber(s) of change to {}", callbacks.len(), table);
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("Change callback for {} panicked; other subscribers unaffected", table);
            }
        }
    }

    /// The number of callbacks currently registered for `table`.
    pub fn subscriber_count(&self, table: &TableRef) -> usize {
        self.subscribers.get(table).map(|e| e.len()).unwrap_or(0)
    }

    fn unregister(&self, table: &TableRef, id: Uuid) {
        if let Some(mut entry) = self.subscribers.get_mut(table) {
            entry.remove(&id);
        }
        // Drop empty per-table maps so the registry does not grow unbounded
        // across observation lifetimes.
        self.subscribers
            .remove_if(table, |_, callbacks| callbacks.is_empty());
    }
}

/// RAII registration handle returned by [`ChangeTracker::register`].
///
/// Unregistering is idempotent: the first call (or drop) removes the
/// callback, later calls are no-ops.
pub struct SubscriptionHandle {
    tracker: Arc<ChangeTracker>,
    table: TableRef,
    id: Uuid,
    active: AtomicBool,
}

impl SubscriptionHandle {
    /// Removes the registered callback from the tracker.
    pub fn unregister(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.tracker.unregister(&self.table, self.id);
        }
    }

    /// The table this subscription watches.
    pub fn table(&self) -> &TableRef {
        &self.table
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notify_without_subscribers_is_noop() {
        let tracker = ChangeTracker::new();
        tracker.notify(&TableRef::new("orders"));
    }

    #[test]
    fn test_two_subscriptions_both_fire_once_per_notify() {
        let tracker = Arc::new(ChangeTracker::new());
        let orders = TableRef::new("orders");

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let h1 = tracker.register(orders.clone(), counter_callback(&first));
        let h2 = tracker.register(orders.clone(), counter_callback(&second));

        tracker.notify(&orders);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        // Removing one subscription leaves the other intact and firing.
        h1.unregister();
        tracker.notify(&orders);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);

        drop(h2);
        tracker.notify(&orders);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notify_is_scoped_to_the_table() {
        let tracker = Arc::new(ChangeTracker::new());
        let count = Arc::new(AtomicUsize::new(0));
        let _handle = tracker.register(TableRef::new("users"), counter_callback(&count));

        tracker.notify(&TableRef::new("accounts"));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tracker.notify(&TableRef::new("users"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let tracker = Arc::new(ChangeTracker::new());
        let orders = TableRef::new("orders");
        let count = Arc::new(AtomicUsize::new(0));

        let handle = tracker.register(orders.clone(), counter_callback(&count));
        handle.unregister();
        handle.unregister();
        drop(handle);

        tracker.notify(&orders);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.subscriber_count(&orders), 0);
    }

    #[test]
    fn test_panicking_callback_does_not_break_others() {
        let tracker = Arc::new(ChangeTracker::new());
        let orders = TableRef::new("orders");
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = tracker.register(orders.clone(), || panic!("observer bug"));
        let _good = tracker.register(orders.clone(), counter_callback(&count));

        tracker.notify(&orders);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_registry_entry() {
        let tracker = Arc::new(ChangeTracker::new());
        let orders = TableRef::new("orders");
        {
            let _handle = tracker.register(orders.clone(), || {});
            assert_eq!(tracker.subscriber_count(&orders), 1);
        }
        assert_eq!(tracker.subscriber_count(&orders), 0);
    }

    #[test]
    fn test_schema_qualified_tables_are_independent() {
        let tracker = Arc::new(ChangeTracker::new());
        let public = TableRef::with_schema("public", "orders");
        let billing = TableRef::with_schema("billing", "orders");

        let count = Arc::new(AtomicUsize::new(0));
        let _handle = tracker.register(public.clone(), counter_callback(&count));

        tracker.notify(&billing);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tracker.notify(&public);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
