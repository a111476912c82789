//! Property-based tests for the windowed result set.
//!
//! These tests verify that the windowing invariants hold across all valid
//! input sequences, using the `proptest` crate for random test case
//! generation.

use std::sync::Arc;

use proptest::prelude::*;
use tablestream_core::{QueryContext, RowAccess, SortDirection, SortValue, WindowedSet};

#[derive(Clone, Debug, PartialEq)]
struct Row {
    id: u32,
    value: i64,
}

impl RowAccess for Row {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }

    fn sort_value(&self, field: &str) -> Option<SortValue> {
        (field == "value").then(|| self.value.into())
    }
}

fn sorted_set(size: i64) -> WindowedSet<Row> {
    let context = QueryContext::builder()
        .page(0, size)
        .sort("value", SortDirection::Ascending)
        .build()
        .unwrap();
    WindowedSet::new(Arc::new(context)).unwrap()
}

fn unsorted_set(size: i64) -> WindowedSet<Row> {
    let context = QueryContext::builder().page(0, size).build().unwrap();
    WindowedSet::new(Arc::new(context)).unwrap()
}

// =============================================================================
// Generators
// =============================================================================

/// Rows with unique ids; values drawn from a narrow range so ties are common.
fn arb_unique_rows(max_len: usize) -> impl Strategy<Value = Vec<Row>> {
    proptest::collection::vec(-50i64..50, 0..=max_len).prop_map(|values| {
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Row {
                id: i as u32,
                value,
            })
            .collect()
    })
}

/// Rows whose ids collide frequently, exercising in-place replacement.
fn arb_colliding_rows(max_len: usize) -> impl Strategy<Value = Vec<Row>> {
    proptest::collection::vec((0u32..8, -50i64..50), 0..=max_len)
        .prop_map(|pairs| pairs.into_iter().map(|(id, value)| Row { id, value }).collect())
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// With paging size N and ascending sort, the window always holds the N
    /// lowest values seen, in ascending order.
    #[test]
    fn prop_window_holds_the_n_lowest_values(rows in arb_unique_rows(40), size in 1i64..8) {
        let mut set = sorted_set(size);
        for row in rows.clone() {
            set.add(row).unwrap();
        }

        let window: Vec<i64> = set.iter().map(|r| r.value).collect();

        // Bounded.
        prop_assert!(window.len() <= size as usize);
        prop_assert_eq!(window.len(), rows.len().min(size as usize));

        // Ascending.
        prop_assert!(window.windows(2).all(|w| w[0] <= w[1]));

        // Exactly the N lowest values seen, compared as multisets.
        let mut expected: Vec<i64> = rows.iter().map(|r| r.value).collect();
        expected.sort_unstable();
        expected.truncate(size as usize);
        prop_assert_eq!(window, expected);
    }

    /// Rebuilding from the same rows yields the same view as a fresh set.
    #[test]
    fn prop_reinitialize_equals_fresh_build(rows in arb_unique_rows(40), size in 1i64..8) {
        let mut reused = sorted_set(size);
        reused.add(Row { id: 9999, value: i64::MAX }).unwrap();
        reused.reinitialize(rows.clone()).unwrap();

        let mut fresh = sorted_set(size);
        fresh.initialize(rows).unwrap();

        let reused_rows: Vec<Row> = reused.iter().cloned().collect();
        let fresh_rows: Vec<Row> = fresh.iter().cloned().collect();
        prop_assert_eq!(reused_rows, fresh_rows);
    }

    /// Without sorting, the window is the first N rows in arrival order.
    #[test]
    fn prop_unsorted_window_keeps_arrival_order(rows in arb_unique_rows(40), size in 1i64..8) {
        let mut set = unsorted_set(size);
        for row in rows.clone() {
            set.add(row).unwrap();
        }

        let window: Vec<u32> = set.iter().map(|r| r.id).collect();
        let expected: Vec<u32> = rows.iter().take(size as usize).map(|r| r.id).collect();
        prop_assert_eq!(window, expected);
    }

    /// Ids stay unique through any sequence of adds and replacements, and a
    /// replacement never changes the entry count.
    #[test]
    fn prop_ids_stay_unique_under_replacement(rows in arb_colliding_rows(40), size in 1i64..8) {
        let mut set = unsorted_set(size);
        for row in rows {
            set.add(row).unwrap();
        }

        let mut ids: Vec<u32> = set.iter().map(|r| r.id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), total);
        prop_assert!(total <= size as usize);
    }

    /// A replaced id keeps its slot (unsorted windows) and carries the most
    /// recent value.
    #[test]
    fn prop_replacement_updates_value_in_place(rows in arb_colliding_rows(40)) {
        let mut set = unsorted_set(64);
        for row in rows.clone() {
            set.add(row).unwrap();
        }

        // Model: first-arrival order of ids, last value per id.
        let mut expected: Vec<Row> = Vec::new();
        for row in rows {
            match expected.iter_mut().find(|r| r.id == row.id) {
                Some(existing) => existing.value = row.value,
                None => expected.push(row),
            }
        }

        let actual: Vec<Row> = set.iter().cloned().collect();
        prop_assert_eq!(actual, expected);
    }
}
