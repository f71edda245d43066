//! Readiness tracking for the process.
//!
//! Readiness follows the health of the supervised database connection.
//! Other components (a health endpoint, a status line in the logs) subscribe
//! to it instead of talking to the supervisor directly.

use std::fmt;

use connwarden_supervisor::Connectivity;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Readiness of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// The database connection is up.
    Ready,
    /// Not ready, with the reason.
    NotReadyYet(String),
    /// Nothing observed yet.
    Unknown,
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReadinessState::Ready => "Ready",
            ReadinessState::NotReadyYet(_) => "NotReadyYet",
            ReadinessState::Unknown => "Unknown",
        }
    }

    /// The reason for `NotReadyYet`, otherwise an empty string.
    pub fn reason(&self) -> &str {
        match self {
            ReadinessState::NotReadyYet(reason) => reason,
            _ => "",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Ready => write!(f, "Ready"),
            ReadinessState::NotReadyYet(reason) => write!(f, "NotReadyYet: {}", reason),
            ReadinessState::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<Connectivity> for ReadinessState {
    fn from(connectivity: Connectivity) -> Self {
        match connectivity {
            Connectivity::Connected => ReadinessState::Ready,
            Connectivity::Disconnected => {
                ReadinessState::NotReadyYet("Database connection lost".to_string())
            }
            Connectivity::Unknown => ReadinessState::Unknown,
        }
    }
}

/// Translates supervisor health updates into readiness updates until the
/// health channel closes or readiness has no subscribers left.
pub async fn listen(
    mut health_rx: watch::Receiver<Connectivity>,
    state_tx: watch::Sender<ReadinessState>,
) {
    debug!("Launching connectivity listener");

    let initial = ReadinessState::from(*health_rx.borrow_and_update());
    debug!("Initial readiness status: {}", initial);
    state_tx.send_replace(initial);

    while health_rx.changed().await.is_ok() {
        let connectivity = *health_rx.borrow_and_update();
        let readiness = ReadinessState::from(connectivity);
        info!(
            "Readiness transition: connectivity {} -> {}",
            connectivity, readiness
        );

        if state_tx.send(readiness).is_err() {
            warn!("No subscribers to readiness status");
            break;
        }
    }

    debug!("Connectivity channel closed, listening stopped");
}

/// Shared readiness tracker.
#[derive(Debug, Clone)]
pub struct Readiness {
    state_tx: watch::Sender<ReadinessState>,
    state_rx: watch::Receiver<ReadinessState>,
}

impl Readiness {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ReadinessState::Unknown);
        Self { state_tx, state_rx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state_rx.clone()
    }

    pub fn current_state(&self) -> ReadinessState {
        self.state_rx.borrow().clone()
    }

    /// Follows the supervisor's health channel in a background task.
    pub fn start_listening(&self, health_rx: watch::Receiver<Connectivity>) {
        let state_tx = self.state_tx.clone();
        tokio::spawn(async move {
            listen(health_rx, state_tx).await;
        });
    }

    /// Manually updates the readiness state.
    pub fn set_state(&self, state: ReadinessState) {
        let old_state = self.state_tx.send_replace(state.clone());
        debug!(
            "The readiness status has changed: {} -> {}",
            old_state, state
        );
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_state_is_ready() {
        assert!(ReadinessState::Ready.is_ready());
        assert!(!ReadinessState::Unknown.is_ready());
        assert!(!ReadinessState::NotReadyYet("error".into()).is_ready());
    }

    #[test]
    fn test_readiness_state_reason() {
        assert_eq!(ReadinessState::Ready.reason(), "");
        assert_eq!(
            ReadinessState::NotReadyYet("test reason".into()).reason(),
            "test reason"
        );
    }

    #[test]
    fn test_from_connectivity() {
        assert_eq!(
            ReadinessState::from(Connectivity::Connected),
            ReadinessState::Ready
        );
        assert_eq!(
            ReadinessState::from(Connectivity::Unknown),
            ReadinessState::Unknown
        );
        assert_eq!(
            ReadinessState::from(Connectivity::Disconnected).as_str(),
            "NotReadyYet"
        );
    }

    #[tokio::test]
    async fn test_readiness_set_state() {
        let readiness = Readiness::new();
        let mut state_rx = readiness.subscribe();
        readiness.set_state(ReadinessState::Ready);
        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow(), ReadinessState::Ready);
    }

    #[tokio::test]
    async fn test_listener_follows_connectivity() {
        let (health_tx, health_rx) = watch::channel(Connectivity::Unknown);
        let readiness = Readiness::new();
        let mut state_rx = readiness.subscribe();
        readiness.start_listening(health_rx);

        health_tx.send_replace(Connectivity::Connected);
        state_rx
            .wait_for(|state| state.is_ready())
            .await
            .unwrap();

        health_tx.send_replace(Connectivity::Disconnected);
        let state = state_rx
            .wait_for(|state| !state.is_ready())
            .await
            .unwrap()
            .clone();
        assert_eq!(state.reason(), "Database connection lost");
    }
}
