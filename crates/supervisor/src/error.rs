//! Error types for the connection supervisor.
//!
//! Only failures of the *initial* connect attempt ever reach the caller.
//! Everything that happens after the first settlement (disconnects, driver
//! `error` events, failed recovery attempts) is absorbed by the supervisor:
//! it is logged, reflected in `is_ok()`, and possibly remediated by the
//! recovery policy.
//!
//! # Error Categories
//!
//! **Initial connect** (surfaced through the `connect()` future):
//! - `InitialConnectTimeout`: nothing settled within the startup window
//! - `InitialConnectRejected`: the driver's connect call failed first
//!
//! **Lifecycle misuse**:
//! - `AlreadyStarted`: `connect()` called twice on a running supervisor
//! - `Stopped`: the run was reset or shut down before it settled
//! - `NotInstalled`: the process-wide default supervisor was never installed
//!
//! **Configuration**:
//! - `Config`: validation failures in supervisor settings

use std::time::Duration;

use thiserror::Error;

/// Error reported by a [`Driver`](crate::driver::Driver) implementation.
///
/// Kept `Clone` so the same failure can be logged and handed to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The driver could not establish a connection.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Closing the driver handle failed. Always treated as best-effort.
    #[error("Close failed: {0}")]
    Close(String),

    /// The database URI could not be interpreted by the driver.
    #[error("Invalid database URI: {0}")]
    InvalidUri(String),
}

/// The unified error type returned by supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No success, rejection or driver resolution within the initial-connect window.
    ///
    /// The process owner decides whether to retry startup.
    #[error("Timeout on initial connect after {0:?}")]
    InitialConnectTimeout(Duration),

    /// The driver's connect call rejected before any success was observed.
    #[error("Initial connect rejected: {0}")]
    InitialConnectRejected(#[source] DriverError),

    /// `connect()` was called while a run is already active.
    ///
    /// Call `reset()` first to start over.
    #[error("Supervisor is already started")]
    AlreadyStarted,

    /// The run was reset or shut down before the initial connect settled.
    #[error("Supervisor stopped before the initial connect settled")]
    Stopped,

    /// The process-wide default supervisor has not been installed.
    #[error("No default supervisor installed")]
    NotInstalled,

    /// Supervisor configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] validator::ValidationErrors),
}

impl SupervisorError {
    /// Returns true for failures of the initial connect attempt.
    pub fn is_initial_connect_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::InitialConnectTimeout(_) | SupervisorError::InitialConnectRejected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = SupervisorError::InitialConnectTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Timeout on initial connect after 30s");
    }

    #[test]
    fn test_rejected_keeps_source() {
        let err = SupervisorError::InitialConnectRejected(DriverError::Connect(
            "connection refused".into(),
        ));
        assert!(err.to_string().contains("connection refused"));

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Connect failed: connection refused"));
    }

    #[test]
    fn test_initial_connect_classification() {
        assert!(SupervisorError::InitialConnectTimeout(Duration::from_secs(1))
            .is_initial_connect_failure());
        assert!(
            SupervisorError::InitialConnectRejected(DriverError::InvalidUri("x".into()))
                .is_initial_connect_failure()
        );
        assert!(!SupervisorError::AlreadyStarted.is_initial_connect_failure());
        assert!(!SupervisorError::Stopped.is_initial_connect_failure());
    }

    #[test]
    fn test_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(SupervisorError::NotInstalled);
        assert_eq!(err.to_string(), "No default supervisor installed");
    }
}
