//! Error types for the observation engine.
//!
//! This module defines backend-agnostic error types. Driver-specific errors
//! (from tokio-postgres, rusqlite, etc.) are converted to these types by the
//! backend crates; no driver error type crosses the notifier boundary.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the observation engine.
///
/// `Clone` so a terminal error can be both pushed to the downstream sink and
/// returned to the caller.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A programming contract was violated at setup time.
    #[error("Setup contract violation: {0}")]
    Setup(#[from] SetupError),

    /// Running or re-running the observed query failed.
    ///
    /// Propagated to the downstream sink as an error signal, terminating
    /// that one observation.
    #[error("Query execution failed: {0}")]
    Query(String),

    /// A change notifier failed in a way that ends its listen loop.
    #[error("Change notifier failed: {0}")]
    Notifier(#[from] NotifierError),

    /// The observation was cancelled. Expected termination, not a fault.
    #[error("Observation cancelled")]
    Cancelled,
}

/// Contract violations detected at setup time.
///
/// These are programming errors, never silently ignored: they fail the
/// observation fast with a descriptive message.
#[derive(Error, Debug, Clone)]
pub enum SetupError {
    /// Paging was enabled with a page size that is not a positive integer.
    #[error("Page size must be a positive integer, got {0}")]
    InvalidPageSize(i64),

    /// The declared sort field does not exist on the observed row type.
    #[error("Sort field '{field}' is not present on rows of type '{row_type}'")]
    MissingSortField { field: String, row_type: String },

    /// A subscription registration query was requested without any columns.
    #[error("Dependency subscription for '{0}' requires an explicit column list")]
    EmptyColumnList(String),
}

/// Failures raised by change notifiers.
///
/// Backend crates translate their driver errors into these variants; the
/// message carries the driver detail as text so the type stays
/// backend-agnostic.
#[derive(Error, Debug, Clone)]
pub enum NotifierError {
    #[error("Failed to connect to the change source: {0}")]
    ConnectFailed(String),

    #[error("Failed to provision notification infrastructure: {0}")]
    ProvisionFailed(String),

    #[error("Listen loop failed: {0}")]
    ListenFailed(String),

    #[error("Dependency subscription failed: {0}")]
    SubscribeFailed(String),

    #[error("Message broker is disabled for database '{0}'")]
    BrokerDisabled(String),

    #[error("Notifier is stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_messages_are_descriptive() {
        let err = SetupError::InvalidPageSize(0);
        assert!(err.to_string().contains("positive integer"));

        let err = SetupError::MissingSortField {
            field: "created_at".to_string(),
            row_type: "Order".to_string(),
        };
        assert!(err.to_string().contains("created_at"));
        assert!(err.to_string().contains("Order"));
    }

    #[test]
    fn test_notifier_error_wraps_into_root_error() {
        let err: Error = NotifierError::ConnectFailed("refused".to_string()).into();
        assert!(matches!(err, Error::Notifier(_)));
        assert!(err.to_string().contains("refused"));
    }
}
