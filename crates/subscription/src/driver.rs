//! The driver seam for dependency-subscription backends.
//!
//! The database driver is an external collaborator: it supplies session
//! open/close, command execution, and the one-shot notification wait. The
//! notifier owns everything above that line (enablement, registration,
//! classification, re-arm, backoff).

use async_trait::async_trait;
use thiserror::Error;

use tablestream_core::errors::SetupError;
use tablestream_core::notify::ListenRequest;

/// Errors surfaced by a concrete subscription driver.
///
/// Translated into [`tablestream_core::errors::NotifierError`] by the
/// notifier; this type never crosses the notifier boundary.
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Command execution failed: {0}")]
    Execute(String),

    #[error("Broker enablement failed: {0}")]
    Broker(String),
}

/// The exact session options the subscription API requires.
///
/// Subscriptions are rejected by the backend unless every one of these
/// options is set to precisely this value for the registering session, so
/// drivers must apply the set verbatim when opening a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub set_options: Vec<(&'static str, &'static str)>,
}

impl SessionOptions {
    pub fn required() -> Self {
        Self {
            set_options: vec![
                ("ANSI_NULLS", "ON"),
                ("ANSI_PADDING", "ON"),
                ("ANSI_WARNINGS", "ON"),
                ("CONCAT_NULL_YIELDS_NULL", "ON"),
                ("QUOTED_IDENTIFIER", "ON"),
                ("NUMERIC_ROUNDABORT", "OFF"),
                ("ARITHABORT", "ON"),
            ],
        }
    }
}

/// Classification of one delivered notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionNotice {
    /// The watched data changed; propagate (debounced) to the observer.
    DataChange,
    /// The backend reported an error condition. Logged, never propagated.
    BackendError(String),
    /// The subscription itself was invalid. Logged, never propagated.
    Invalid(String),
}

/// Builds the narrow registration query for a listen request.
///
/// Subscriptions must name their columns explicitly; `select *` registrations
/// are rejected by the backend, so an empty column list is a setup-time
/// contract violation here.
pub fn registration_query(request: &ListenRequest) -> Result<String, SetupError> {
    if request.columns.is_empty() {
        return Err(SetupError::EmptyColumnList(
            request.table.qualified_name(),
        ));
    }
    let columns = request
        .columns
        .iter()
        .map(|column| format!("[{}]", column))
        .collect::<Vec<_>>()
        .join(", ");
    let table = match request.table.schema() {
        Some(schema) => format!("[{}].[{}]", schema, request.table.table()),
        None => format!("[dbo].[{}]", request.table.table()),
    };
    Ok(format!("SELECT {} FROM {}", columns, table))
}

/// Opens subscription sessions against one backend database.
#[async_trait]
pub trait SubscriptionDriver: Send + Sync {
    type Session: SubscriptionSession + 'static;

    /// A stable name for the backend family, used to key the process-wide
    /// enablement state together with [`database_name`](Self::database_name).
    fn backend_name(&self) -> &str;

    fn database_name(&self) -> &str;

    /// Turns on the backend's message-broker facility for the database.
    ///
    /// Called at most once per (backend, database) pair per process.
    async fn enable_broker(&self) -> Result<(), DriverError>;

    /// Opens a dedicated session with `options` applied verbatim.
    async fn open_session(&self, options: &SessionOptions)
        -> Result<Self::Session, DriverError>;
}

/// One dedicated subscription session.
///
/// The underlying connection cannot tolerate concurrent command execution;
/// callers serialize access through a single-slot guard.
#[async_trait]
pub trait SubscriptionSession: Send {
    /// Executes the registration query and fully drains its result, arming
    /// one one-shot subscription.
    async fn register(&mut self, query: &str) -> Result<(), DriverError>;

    /// Waits for the single notification the armed subscription delivers.
    async fn wait_notice(&mut self) -> Result<SubscriptionNotice, DriverError>;

    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablestream_core::table::TableRef;

    #[test]
    fn test_registration_query_is_column_limited() {
        let request = ListenRequest::new(TableRef::with_schema("sales", "orders"))
            .with_columns(["id", "status"]);
        let query = registration_query(&request).unwrap();
        assert_eq!(query, "SELECT [id], [status] FROM [sales].[orders]");
    }

    #[test]
    fn test_registration_defaults_to_dbo_schema() {
        let request = ListenRequest::new(TableRef::new("orders")).with_columns(["id"]);
        assert_eq!(
            registration_query(&request).unwrap(),
            "SELECT [id] FROM [dbo].[orders]"
        );
    }

    #[test]
    fn test_empty_column_list_is_a_contract_violation() {
        let request = ListenRequest::new(TableRef::new("orders"));
        let err = registration_query(&request).unwrap_err();
        assert!(matches!(err, SetupError::EmptyColumnList(_)));
    }

    #[test]
    fn test_required_session_options_are_fixed() {
        let options = SessionOptions::required();
        assert_eq!(options.set_options.len(), 7);
        assert!(options.set_options.contains(&("ARITHABORT", "ON")));
        assert!(options.set_options.contains(&("NUMERIC_ROUNDABORT", "OFF")));
    }
}
