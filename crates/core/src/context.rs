//! Per-observation query context.
//!
//! Paging and sorting are fixed for the lifetime of an observation; only the
//! total item count changes, updated by the driver after each count query.
//! The context is shared by `Arc` between the driver and the windowed result
//! set.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::SetupError;

/// Sort direction for the declared sort field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Paging settings. When disabled, the view is unbounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub size: usize,
    pub enabled: bool,
}

impl Paging {
    fn disabled() -> Self {
        Self {
            page: 0,
            size: 0,
            enabled: false,
        }
    }
}

/// Sorting settings. When disabled, insertion order is preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sorting {
    pub field: String,
    pub direction: SortDirection,
    pub enabled: bool,
}

impl Sorting {
    fn disabled() -> Self {
        Self {
            field: String::new(),
            direction: SortDirection::Ascending,
            enabled: false,
        }
    }
}

/// The paging/sorting contract of one live query plus its running total.
#[derive(Debug)]
pub struct QueryContext {
    paging: Paging,
    sorting: Sorting,
    total_items: AtomicU64,
}

impl QueryContext {
    /// An unpaged, unsorted context.
    pub fn unpaged() -> Self {
        Self {
            paging: Paging::disabled(),
            sorting: Sorting::disabled(),
            total_items: AtomicU64::new(0),
        }
    }

    pub fn builder() -> QueryContextBuilder {
        QueryContextBuilder::default()
    }

    pub fn paging(&self) -> &Paging {
        &self.paging
    }

    pub fn sorting(&self) -> &Sorting {
        &self.sorting
    }

    /// The window capacity, or `None` when paging is disabled.
    pub fn page_size(&self) -> Option<usize> {
        self.paging.enabled.then_some(self.paging.size)
    }

    /// The active sort, or `None` when sorting is disabled.
    pub fn sort(&self) -> Option<(&str, SortDirection)> {
        self.sorting
            .enabled
            .then(|| (self.sorting.field.as_str(), self.sorting.direction))
    }

    pub fn total_items(&self) -> u64 {
        self.total_items.load(Ordering::Acquire)
    }

    pub fn set_total_items(&self, total: u64) {
        self.total_items.store(total, Ordering::Release);
    }

    /// Fails fast on contract violations: paging enabled with a page size
    /// that is not a positive integer.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.paging.enabled && self.paging.size == 0 {
            return Err(SetupError::InvalidPageSize(0));
        }
        Ok(())
    }
}

/// Builder for [`QueryContext`].
#[derive(Default)]
pub struct QueryContextBuilder {
    page: Option<u32>,
    size: Option<i64>,
    sort: Option<(String, SortDirection)>,
}

impl QueryContextBuilder {
    /// Enables paging with the given zero-based page and page size.
    pub fn page(mut self, page: u32, size: i64) -> Self {
        self.page = Some(page);
        self.size = Some(size);
        self
    }

    /// Enables sorting by `field` in `direction`.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some((field.into(), direction));
        self
    }

    pub fn build(self) -> Result<QueryContext, SetupError> {
        let paging = match (self.page, self.size) {
            (Some(page), Some(size)) => {
                if size <= 0 {
                    return Err(SetupError::InvalidPageSize(size));
                }
                Paging {
                    page,
                    size: size as usize,
                    enabled: true,
                }
            }
            _ => Paging::disabled(),
        };

        let sorting = match self.sort {
            Some((field, direction)) => Sorting {
                field,
                direction,
                enabled: true,
            },
            None => Sorting::disabled(),
        };

        Ok(QueryContext {
            paging,
            sorting,
            total_items: AtomicU64::new(0),
        })
    }
}
