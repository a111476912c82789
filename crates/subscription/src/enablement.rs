//! Process-wide broker enablement state.
//!
//! Enabling the backend's message-broker facility is attempted at most once
//! per (backend, database) pair for the lifetime of the process; a failed
//! attempt is never retried automatically, only logged. The state is an
//! explicit object with this documented lifecycle - initialized on first
//! use, never reset - and it is injected into notifier options so tests can
//! construct their own instance instead of sharing the process default.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttemptState {
    Pending,
    Enabled,
    Disabled,
}

/// Lock-guarded dedup set keyed by backend + database.
#[derive(Default)]
pub struct BrokerEnablement {
    state: Mutex<HashMap<(String, String), AttemptState>>,
}

impl BrokerEnablement {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance used when none is injected.
    pub fn global() -> Arc<BrokerEnablement> {
        static GLOBAL: OnceLock<Arc<BrokerEnablement>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(BrokerEnablement::new())))
    }

    /// Claims the single enablement attempt for the pair.
    ///
    /// Returns `true` exactly once per pair per process; the caller that
    /// claimed it must follow up with [`record_outcome`](Self::record_outcome).
    pub fn claim_attempt(&self, backend: &str, database: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let key = (backend.to_string(), database.to_string());
        if state.contains_key(&key) {
            return false;
        }
        state.insert(key, AttemptState::Pending);
        true
    }

    /// Records how the claimed attempt went.
    pub fn record_outcome(&self, backend: &str, database: &str, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        state.insert(
            (backend.to_string(), database.to_string()),
            if enabled {
                AttemptState::Enabled
            } else {
                AttemptState::Disabled
            },
        );
    }

    /// Whether the broker is known to be enabled for the pair.
    pub fn is_enabled(&self, backend: &str, database: &str) -> bool {
        let state = self.state.lock().unwrap();
        matches!(
            state.get(&(backend.to_string(), database.to_string())),
            Some(AttemptState::Enabled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_granted_once_per_pair() {
        let enablement = BrokerEnablement::new();
        assert!(enablement.claim_attempt("mssql", "sales"));
        assert!(!enablement.claim_attempt("mssql", "sales"));

        // Other pairs are independent.
        assert!(enablement.claim_attempt("mssql", "billing"));
        assert!(enablement.claim_attempt("other", "sales"));
    }

    #[test]
    fn test_failed_attempt_is_never_reclaimed() {
        let enablement = BrokerEnablement::new();
        assert!(enablement.claim_attempt("mssql", "sales"));
        enablement.record_outcome("mssql", "sales", false);

        assert!(!enablement.claim_attempt("mssql", "sales"));
        assert!(!enablement.is_enabled("mssql", "sales"));
    }

    #[test]
    fn test_successful_outcome_is_visible() {
        let enablement = BrokerEnablement::new();
        assert!(enablement.claim_attempt("mssql", "sales"));
        enablement.record_outcome("mssql", "sales", true);
        assert!(enablement.is_enabled("mssql", "sales"));
    }

    #[test]
    fn test_global_instance_is_shared() {
        let a = BrokerEnablement::global();
        let b = BrokerEnablement::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
