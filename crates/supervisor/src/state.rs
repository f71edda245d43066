//! Connection state tracked by the supervisor.
//!
//! [`Connectivity`] is the tri-state health value published to `is_ok()`
//! and to watch-channel subscribers. [`ConnectionState`] is the full state
//! the lifecycle machine transitions over; it also tracks the pending
//! recovery action and whether the initial `connect()` has settled.
//!
//! ```ignore
//! let state = ConnectionState::new(Backoff::default());
//! assert_eq!(state.connectivity, Connectivity::Unknown);
//! assert!(!state.connectivity.is_connected());
//! ```

use std::fmt;

use crate::backoff::Backoff;

/// Tri-state connection health.
///
/// - `Unknown`: nothing observed yet
/// - `Connected`: the last event was `connected` or `reconnected`
/// - `Disconnected`: the last event was `disconnected`, `error`, or an
///   initial-connect failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl Connectivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connectivity::Unknown => "Unknown",
            Connectivity::Connected => "Connected",
            Connectivity::Disconnected => "Disconnected",
        }
    }

    /// True only for `Connected`. `Unknown` counts as not connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Connectivity::Connected)
    }

    /// True once any lifecycle event or initial-connect outcome was observed.
    pub fn is_known(&self) -> bool {
        !matches!(self, Connectivity::Unknown)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one armed timer. Firings carrying a stale id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Guards against concurrent recovery attempts.
///
/// Manual-reconnect runs `Idle -> Scheduling -> Scheduled -> Idle`;
/// signal-only goes straight from `Idle` to `Scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingRecovery {
    /// Nothing in flight.
    #[default]
    Idle,

    /// The driver close is in flight; the delay timer is armed once it completes.
    Scheduling,

    /// A timer is armed (reconnect delay or missing-connection signal).
    Scheduled(TimerId),

    /// A success arrived while the close was in flight; drop the attempt
    /// once the close completes.
    Skip,
}

impl PendingRecovery {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingRecovery::Idle => "Idle",
            PendingRecovery::Scheduling => "Scheduling",
            PendingRecovery::Scheduled(_) => "Scheduled",
            PendingRecovery::Skip => "Skip",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PendingRecovery::Idle)
    }
}

impl fmt::Display for PendingRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingRecovery::Scheduled(id) => write!(f, "Scheduled ({id})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Whether the `connect()` future has been settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialPhase {
    #[default]
    Pending,
    Settled,
}

/// Everything the lifecycle machine knows about one supervised connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub connectivity: Connectivity,
    pub pending: PendingRecovery,
    pub initial: InitialPhase,
    pub backoff: Backoff,
    next_timer: u64,
}

impl ConnectionState {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            connectivity: Connectivity::Unknown,
            pending: PendingRecovery::Idle,
            initial: InitialPhase::Pending,
            backoff,
            next_timer: 0,
        }
    }

    /// Allocates a fresh timer id.
    pub(crate) fn allocate_timer(&mut self) -> TimerId {
        self.next_timer += 1;
        TimerId(self.next_timer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_as_str() {
        assert_eq!(Connectivity::Unknown.as_str(), "Unknown");
        assert_eq!(Connectivity::Connected.as_str(), "Connected");
        assert_eq!(Connectivity::Disconnected.as_str(), "Disconnected");
    }

    #[test]
    fn test_unknown_is_not_connected() {
        assert!(!Connectivity::Unknown.is_connected());
        assert!(!Connectivity::Unknown.is_known());
        assert!(Connectivity::Connected.is_connected());
        assert!(!Connectivity::Disconnected.is_connected());
        assert!(Connectivity::Disconnected.is_known());
    }

    #[test]
    fn test_pending_display() {
        assert_eq!(PendingRecovery::Idle.to_string(), "Idle");
        assert_eq!(
            PendingRecovery::Scheduled(TimerId(3)).to_string(),
            "Scheduled (timer#3)"
        );
        assert_eq!(PendingRecovery::Skip.to_string(), "Skip");
    }

    #[test]
    fn test_new_state() {
        let state = ConnectionState::new(Backoff::default());
        assert_eq!(state.connectivity, Connectivity::Unknown);
        assert!(state.pending.is_idle());
        assert_eq!(state.initial, InitialPhase::Pending);
    }

    #[test]
    fn test_timer_ids_are_unique() {
        let mut state = ConnectionState::new(Backoff::default());
        let a = state.allocate_timer();
        let b = state.allocate_timer();
        assert_ne!(a, b);
    }
}
