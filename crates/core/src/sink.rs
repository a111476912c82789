//! Push-style delivery seam toward the streaming layer.
//!
//! The sink receives the materialized windowed view after every re-query,
//! an error signal when the observation dies, and a completion signal when
//! it is cleaned up. Serialization and transport (WebSocket framing, HTTP
//! streaming) live behind the sink, out of scope here.
//!
//! # Design Rules
//!
//! - `next()` must be fast and non-blocking (no network calls inline)
//! - Implementations should queue views for async delivery
//! - A slow subscriber must not stall the observation beyond the sink's own
//!   queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::errors::Error;
use crate::window::WindowedView;

/// Receives the output of one observation.
pub trait ViewSink<T>: Send + Sync {
    /// A fresh materialized view is available.
    fn next(&self, view: WindowedView<T>);

    /// The observation failed; `complete` will follow from cleanup.
    fn error(&self, error: Error);

    /// The observation finished; no further signals will arrive.
    fn complete(&self);
}

/// No-op sink for contexts that only care about side effects.
#[derive(Clone, Default)]
pub struct NoOpViewSink;

impl<T> ViewSink<T> for NoOpViewSink {
    fn next(&self, _view: WindowedView<T>) {}

    fn error(&self, _error: Error) {}

    fn complete(&self) {}
}

/// Mock sink for testing - records every signal it receives.
#[derive(Clone)]
pub struct MockViewSink<T> {
    views: Arc<Mutex<Vec<WindowedView<T>>>>,
    errors: Arc<Mutex<Vec<String>>>,
    completed: Arc<AtomicBool>,
}

impl<T> Default for MockViewSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MockViewSink<T> {
    pub fn new() -> Self {
        Self {
            views: Arc::new(Mutex::new(Vec::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Views received so far, oldest first.
    pub fn views(&self) -> Vec<WindowedView<T>>
    where
        T: Clone,
    {
        self.views.lock().unwrap().clone()
    }

    pub fn view_count(&self) -> usize {
        self.views.lock().unwrap().len()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

impl<T: Send> ViewSink<T> for MockViewSink<T> {
    fn next(&self, view: WindowedView<T>) {
        self.views.lock().unwrap().push(view);
    }

    fn error(&self, error: Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn complete(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

/// One signal on the delivery channel.
#[derive(Debug)]
pub enum SinkEvent<T> {
    Next(WindowedView<T>),
    Error(Error),
    Completed,
}

/// Sink that forwards signals over an unbounded channel.
///
/// This is the usual bridge to the delivery layer: the observation pushes
/// without blocking, the transport drains the receiver at its own pace.
pub struct ChannelSink<T> {
    tx: mpsc::UnboundedSender<SinkEvent<T>>,
}

impl<T> ChannelSink<T> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl<T: Send> ViewSink<T> for ChannelSink<T> {
    fn next(&self, view: WindowedView<T>) {
        // A closed receiver means the subscriber went away; the observation
        // owner is responsible for cancelling, so drops are harmless here.
        let _ = self.tx.send(SinkEvent::Next(view));
    }

    fn error(&self, error: Error) {
        let _ = self.tx.send(SinkEvent::Error(error));
    }

    fn complete(&self) {
        let _ = self.tx.send(SinkEvent::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_sink_does_not_panic() {
        let sink = NoOpViewSink;
        ViewSink::next(&sink, WindowedView::new(vec![1, 2], 2));
        ViewSink::<i32>::error(&sink, Error::Query("boom".to_string()));
        ViewSink::<i32>::complete(&sink);
    }

    #[test]
    fn test_mock_sink_records_signals() {
        let sink = MockViewSink::new();
        sink.next(WindowedView::new(vec![1], 1));
        sink.next(WindowedView::new(vec![1, 2], 2));
        sink.error(Error::Query("boom".to_string()));
        sink.complete();

        assert_eq!(sink.view_count(), 2);
        assert_eq!(sink.views()[1].rows, vec![1, 2]);
        assert_eq!(sink.errors().len(), 1);
        assert!(sink.is_completed());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.next(WindowedView::new(vec!["a"], 1));
        sink.complete();

        assert!(matches!(rx.recv().await, Some(SinkEvent::Next(view)) if view.rows == vec!["a"]));
        assert!(matches!(rx.recv().await, Some(SinkEvent::Completed)));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.next(WindowedView::new(vec![1], 1));
        sink.complete();
    }
}
