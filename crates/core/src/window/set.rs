//! The windowed result set.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::context::{QueryContext, SortDirection};
use crate::errors::SetupError;
use crate::keys::{RowAccess, SortValue};
use crate::window::view::WindowedView;

struct Entry<T: RowAccess> {
    id: T::Id,
    sort_key: Option<SortValue>,
    row: T,
}

/// A bounded, sorted, in-memory collection holding the current page of a
/// query result, maintained incrementally.
///
/// Invariants:
/// - ids are unique within the set
/// - when sorting is active, entries are in sort order; otherwise insertion
///   order is preserved
/// - at most `page_size` entries are retained when paging is active; entries
///   that would rank outside the window are rejected
///
/// Replacing an existing id updates its value in place without repositioning
/// it. A replacement whose sort key changed therefore sits at its old
/// position until the next [`reinitialize`](Self::reinitialize) from a fresh
/// query rebuilds the order.
pub struct WindowedSet<T: RowAccess> {
    context: Arc<QueryContext>,
    // Capacity and sort are resolved once per context binding, not per
    // operation.
    capacity: Option<usize>,
    sort: Option<(String, SortDirection)>,
    entries: Vec<Entry<T>>,
}

impl<T: RowAccess> WindowedSet<T> {
    /// Creates an empty set bound to `context`.
    ///
    /// Fails fast when the context violates the paging contract.
    pub fn new(context: Arc<QueryContext>) -> Result<Self, SetupError> {
        context.validate()?;
        let capacity = context.page_size();
        let sort = context
            .sort()
            .map(|(field, direction)| (field.to_string(), direction));
        Ok(Self {
            context,
            capacity,
            sort,
            entries: Vec::new(),
        })
    }

    /// Rebinds the set to a new context.
    ///
    /// Internal storage is reset only when the window shrinks or the sort
    /// key/direction actually changes; otherwise entries and resolved
    /// comparers are reused.
    pub fn rebind(&mut self, context: Arc<QueryContext>) -> Result<(), SetupError> {
        context.validate()?;
        let capacity = context.page_size();
        let sort = context
            .sort()
            .map(|(field, direction)| (field.to_string(), direction));

        let shrinks = match (self.capacity, capacity) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(old), Some(new)) => new < old,
        };
        if shrinks || sort != self.sort {
            self.entries.clear();
        }

        self.context = context;
        self.capacity = capacity;
        self.sort = sort;
        Ok(())
    }

    /// Adds `row` to the window, or replaces the entry sharing its id.
    ///
    /// Returns `Ok(true)` when the row was inserted or replaced, `Ok(false)`
    /// when it was rejected for ranking outside the full window.
    pub fn add(&mut self, row: T) -> Result<bool, SetupError> {
        let id = row.id();
        let sort_key = self.sort_key_for(&row)?;

        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            // In-place replacement preserves position; order is corrected by
            // the next full reinitialization.
            self.entries[pos].row = row;
            self.entries[pos].sort_key = sort_key;
            return Ok(true);
        }

        let at_capacity = self
            .capacity
            .is_some_and(|capacity| self.entries.len() >= capacity);
        let entry = Entry { id, sort_key, row };

        match &self.sort {
            None => {
                if at_capacity {
                    return Ok(false);
                }
                self.entries.push(entry);
            }
            Some((_, direction)) => {
                let pos = self.insert_position(entry.sort_key.as_ref(), *direction);
                if at_capacity {
                    if pos == self.entries.len() {
                        // Does not rank ahead of the current last entry.
                        return Ok(false);
                    }
                    self.entries.pop();
                }
                self.entries.insert(pos, entry);
            }
        }
        Ok(true)
    }

    /// Removes the entry with `id`, if present.
    pub fn remove(&mut self, id: &T::Id) -> bool {
        match self.entries.iter().position(|e| &e.id == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Seeds the set from `rows` through the normal add path, so the window
    /// bound and sort order hold for the seed too.
    pub fn initialize(&mut self, rows: impl IntoIterator<Item = T>) -> Result<(), SetupError> {
        for row in rows {
            self.add(row)?;
        }
        Ok(())
    }

    /// Clears the set and seeds it from `rows`.
    pub fn reinitialize(&mut self, rows: impl IntoIterator<Item = T>) -> Result<(), SetupError> {
        self.entries.clear();
        self.initialize(rows)
    }

    /// Rows in view order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.row)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    fn sort_key_for(&self, row: &T) -> Result<Option<SortValue>, SetupError> {
        match &self.sort {
            None => Ok(None),
            Some((field, _)) => match row.sort_value(field) {
                Some(value) => Ok(Some(value)),
                None => Err(SetupError::MissingSortField {
                    field: field.clone(),
                    row_type: std::any::type_name::<T>().to_string(),
                }),
            },
        }
    }

    /// First index whose entry the new key strictly precedes; ties keep
    /// arrival order.
    fn insert_position(&self, key: Option<&SortValue>, direction: SortDirection) -> usize {
        let key = match key {
            Some(key) => key,
            None => return self.entries.len(),
        };
        self.entries
            .iter()
            .position(|entry| {
                let existing = entry
                    .sort_key
                    .as_ref()
                    .unwrap_or(&SortValue::Null);
                let ord = key.compare(existing);
                let ord = match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                };
                ord == Ordering::Less
            })
            .unwrap_or(self.entries.len())
    }
}

impl<T: RowAccess + Clone> WindowedSet<T> {
    /// Materializes the current view together with the context's running
    /// total.
    pub fn to_view(&self) -> WindowedView<T> {
        WindowedView::new(
            self.iter().cloned().collect(),
            self.context.total_items(),
        )
    }
}
