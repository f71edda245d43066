//! The driver collaborator: the database client library being supervised.
//!
//! The supervisor never talks to a database itself. It needs a driver that
//! can connect and close, and that reports what happens to its connection
//! through a stream of [`LifecycleEvent`]s. A driver may reconnect on its own
//! (and then emit `Reconnected`), or it may get stuck; the supervisor handles
//! both.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{error::DriverError, options::TransportOptions};

/// The closed set of lifecycle events a driver emits for its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A connection was established.
    Connected,
    /// The driver re-established a lost connection on its own.
    Reconnected,
    /// The connection was lost.
    Disconnected,
    /// The driver reported an error; the payload is its message.
    Error(String),
}

impl LifecycleEvent {
    /// Short event name, matching the names drivers conventionally use.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Connected => "connected",
            LifecycleEvent::Reconnected => "reconnected",
            LifecycleEvent::Disconnected => "disconnected",
            LifecycleEvent::Error(_) => "error",
        }
    }

    /// True for `Connected` and `Reconnected`.
    pub fn is_success(&self) -> bool {
        matches!(self, LifecycleEvent::Connected | LifecycleEvent::Reconnected)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Error(message) => write!(f, "error ({message})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A database driver that the supervisor can drive and observe.
///
/// Implementations must be cheap to share (`Arc<dyn Driver>`); the
/// supervisor calls `connect` and `close` from spawned tasks.
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug + 'static {
    /// Returns a fresh receiver for the driver's lifecycle events.
    ///
    /// The supervisor subscribes once per run, before issuing `connect`, so a
    /// fast completion cannot be missed.
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent>;

    /// Opens the connection to `uri` using the resolved transport options.
    ///
    /// Resolving means the driver accepted the request. Lifecycle events are
    /// still expected to report the actual connection state.
    async fn connect(&self, uri: &str, options: &TransportOptions) -> Result<(), DriverError>;

    /// Closes the connection. Best effort: the supervisor ignores failures.
    async fn close(&self) -> Result<(), DriverError>;

    /// Toggles verbose driver tracing.
    fn set_debug(&self, _enabled: bool) {}
}
