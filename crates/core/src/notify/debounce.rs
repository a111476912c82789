//! Notification debouncing.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Collapses bursts of notifications into a single trigger.
///
/// The first notification in a quiet period is accepted; every further
/// notification within the configured interval is suppressed. Safe to call
/// from any thread, including native callback threads, so it uses a plain
/// mutex rather than async machinery.
pub struct Debouncer {
    interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: Mutex::new(None),
        }
    }

    /// Returns `true` when this notification should propagate.
    pub fn accept(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_accepted.lock().unwrap();
        match *last {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Forgets the last accepted notification, so the next one propagates
    /// immediately. Used when a listener re-arms after a gap.
    pub fn reset(&self) {
        *self.last_accepted.lock().unwrap() = None;
    }
}
