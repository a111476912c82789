//! Materialized view payload.

use serde::Serialize;

/// The current page of a live query, as pushed to a [`crate::sink::ViewSink`].
///
/// Rows are in view order. `total_items` is the unpaged result count from the
/// most recent count query, so subscribers can render pagination without a
/// second round trip.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WindowedView<T> {
    pub rows: Vec<T>,
    pub total_items: u64,
}

impl<T> WindowedView<T> {
    pub fn new(rows: Vec<T>, total_items: u64) -> Self {
        Self { rows, total_items }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
