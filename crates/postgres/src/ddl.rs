//! Channel naming and trigger DDL.

use tablestream_core::TableRef;

/// Lowercases and replaces anything outside `[a-z0-9_]` so the identifier is
/// safe inside quoted DDL and channel names.
fn sanitize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The `NOTIFY` channel a table publishes on.
pub(crate) fn channel_name(prefix: &str, table: &TableRef) -> String {
    format!("{}_{}", sanitize(prefix), sanitize(&table.qualified_name()))
}

pub(crate) fn function_name(prefix: &str, table: &TableRef) -> String {
    format!("{}_notify", channel_name(prefix, table))
}

pub(crate) fn trigger_name(prefix: &str, table: &TableRef) -> String {
    format!("{}_trigger", channel_name(prefix, table))
}

fn quoted_table(table: &TableRef) -> String {
    match table.schema() {
        Some(schema) => format!("\"{}\".\"{}\"", schema, table.table()),
        None => format!("\"{}\"", table.table()),
    }
}

/// DDL that (re)creates the per-table notify function and trigger.
///
/// The function is replaced in place; the trigger is dropped if it exists and
/// recreated, so repeated provisioning converges on the same state.
pub(crate) fn provision_sql(prefix: &str, table: &TableRef) -> String {
    let channel = channel_name(prefix, table);
    let function = function_name(prefix, table);
    let trigger = trigger_name(prefix, table);
    let target = quoted_table(table);
    format!(
        r#"CREATE OR REPLACE FUNCTION "{function}"() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify('{channel}', TG_OP);
    RETURN NULL;
END;
$$ LANGUAGE plpgsql;
DROP TRIGGER IF EXISTS "{trigger}" ON {target};
CREATE TRIGGER "{trigger}"
AFTER INSERT OR UPDATE OR DELETE ON {target}
FOR EACH ROW EXECUTE FUNCTION "{function}"();"#
    )
}

pub(crate) fn listen_sql(channel: &str) -> String {
    format!("LISTEN \"{}\"", channel)
}

pub(crate) fn unlisten_sql(channel: &str) -> String {
    format!("UNLISTEN \"{}\"", channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_is_sanitized() {
        let table = TableRef::with_schema("Public", "Order-Items");
        assert_eq!(channel_name("tablestream", &table), "tablestream_public_order_items");
    }

    #[test]
    fn test_distinct_schemas_get_distinct_channels() {
        let public = TableRef::with_schema("public", "orders");
        let billing = TableRef::with_schema("billing", "orders");
        assert_ne!(channel_name("ts", &public), channel_name("ts", &billing));
    }

    #[test]
    fn test_provision_sql_is_idempotent_ddl() {
        let table = TableRef::with_schema("public", "orders");
        let sql = provision_sql("ts", &table);
        assert!(sql.contains("CREATE OR REPLACE FUNCTION"));
        assert!(sql.contains("DROP TRIGGER IF EXISTS"));
        assert!(sql.contains("pg_notify('ts_public_orders', TG_OP)"));
        assert!(sql.contains("AFTER INSERT OR UPDATE OR DELETE ON \"public\".\"orders\""));
    }

    #[test]
    fn test_unqualified_table_ddl() {
        let table = TableRef::new("orders");
        let sql = provision_sql("ts", &table);
        assert!(sql.contains("ON \"orders\""));
    }

    #[test]
    fn test_listen_unlisten_quote_the_channel() {
        assert_eq!(listen_sql("ts_orders"), "LISTEN \"ts_orders\"");
        assert_eq!(unlisten_sql("ts_orders"), "UNLISTEN \"ts_orders\"");
    }
}
