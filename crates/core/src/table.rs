//! Stable table identity.
//!
//! Writers and observers are correlated by the schema-qualified table name
//! rather than by row type identity, so proxy types, inheritance, and rows
//! detached after deletion cannot break the correlation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A schema-qualified reference to a database table.
///
/// Equality and hashing consider both schema and table, so `"public.orders"`
/// and `"billing.orders"` are distinct keys in the change tracker.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    schema: Option<String>,
    table: String,
}

impl TableRef {
    /// Creates a reference to a table without a schema qualifier.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
        }
    }

    /// Creates a reference to a table in an explicit schema.
    pub fn with_schema(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            table: table.into(),
        }
    }

    /// The unqualified table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The schema, if one was declared.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The qualified name, `schema.table` or just `table`.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

impl From<&str> for TableRef {
    /// Parses `"schema.table"` into a qualified reference; a bare name stays
    /// unqualified.
    fn from(value: &str) -> Self {
        match value.split_once('.') {
            Some((schema, table)) => Self::with_schema(schema, table),
            None => Self::new(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_qualified_name() {
        assert_eq!(TableRef::new("orders").qualified_name(), "orders");
        assert_eq!(
            TableRef::with_schema("billing", "orders").qualified_name(),
            "billing.orders"
        );
    }

    #[test]
    fn test_schema_distinguishes_tables() {
        let mut set = HashSet::new();
        set.insert(TableRef::with_schema("public", "orders"));
        set.insert(TableRef::with_schema("billing", "orders"));
        set.insert(TableRef::new("orders"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_parse_from_str() {
        let parsed = TableRef::from("public.orders");
        assert_eq!(parsed.schema(), Some("public"));
        assert_eq!(parsed.table(), "orders");

        let bare = TableRef::from("orders");
        assert_eq!(bare.schema(), None);
        assert_eq!(bare.table(), "orders");
    }

    #[test]
    fn test_display_matches_qualified_name() {
        let table = TableRef::with_schema("public", "users");
        assert_eq!(table.to_string(), table.qualified_name());
    }
}
