//! Row identity and sort-field access.
//!
//! Rather than resolving identity and sort fields through runtime type
//! introspection, observed row types declare a static accessor capability:
//! an id, and a typed sort value for any field the query context may sort
//! by. The windowed result set resolves both once per context binding.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A typed, orderable value extracted from a row's sort field.
///
/// Values of different kinds order by kind rank (nulls first); integers and
/// floats compare numerically with each other.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SortValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            SortValue::Null => 0,
            SortValue::Bool(_) => 1,
            SortValue::Int(_) | SortValue::Float(_) => 2,
            SortValue::Text(_) => 3,
            SortValue::Timestamp(_) => 4,
        }
    }

    /// Total order over sort values.
    ///
    /// Floats use IEEE total ordering so NaN does not poison the window's
    /// sort invariant.
    pub fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Bool(a), SortValue::Bool(b)) => a.cmp(b),
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => a.total_cmp(b),
            (SortValue::Int(a), SortValue::Float(b)) => (*a as f64).total_cmp(b),
            (SortValue::Float(a), SortValue::Int(b)) => a.total_cmp(&(*b as f64)),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Timestamp(a), SortValue::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<i64> for SortValue {
    fn from(value: i64) -> Self {
        SortValue::Int(value)
    }
}

impl From<f64> for SortValue {
    fn from(value: f64) -> Self {
        SortValue::Float(value)
    }
}

impl From<&str> for SortValue {
    fn from(value: &str) -> Self {
        SortValue::Text(value.to_string())
    }
}

impl From<String> for SortValue {
    fn from(value: String) -> Self {
        SortValue::Text(value)
    }
}

impl From<DateTime<Utc>> for SortValue {
    fn from(value: DateTime<Utc>) -> Self {
        SortValue::Timestamp(value)
    }
}

impl From<bool> for SortValue {
    fn from(value: bool) -> Self {
        SortValue::Bool(value)
    }
}

impl<T: Into<SortValue>> From<Option<T>> for SortValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SortValue::Null)
    }
}

/// Statically-declared identity and sort-field accessors for a row type.
///
/// Implemented by the caller per observed row type. `sort_value` returns
/// `None` for a field the type does not carry, which the windowed result set
/// surfaces as a setup-time contract violation.
pub trait RowAccess {
    /// The opaque comparable key identifying a row. Unique within one
    /// windowed result set.
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    fn sort_value(&self, field: &str) -> Option<SortValue>;
}
