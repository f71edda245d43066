//! Lifecycle state machine.
//!
//! Every input the supervisor reacts to (driver lifecycle events, the outcome
//! of the initial connect, completion of a driver close, a timer firing) goes
//! through [`step`], a pure function from the current [`ConnectionState`] to
//! the next one plus a list of [`Command`]s. The connection kernel executes
//! the commands; nothing in here performs I/O, so the whole policy can be
//! tested without a driver or a runtime.
//!
//! # Transitions
//!
//! ```text
//! connected / reconnected  -> Connected, cancel pending recovery, settle initial
//! disconnected             -> Disconnected, start recovery unless pending
//! error                    -> Disconnected, fatal log, recovery (manual policy only)
//! close completed          -> Scheduling: arm delay timer | Skip: drop attempt
//! timer fired (current id) -> signal-only: fatal signal | manual: reconnect
//! reconnect rejected       -> Disconnected, restart recovery unless pending
//! ```

use std::time::Duration;

use serde_json::{json, Value};

use crate::{
    config::{RecoveryConfig, RecoveryPolicy},
    driver::LifecycleEvent,
    error::DriverError,
    logging::Level,
    state::{ConnectionState, Connectivity, InitialPhase, PendingRecovery, TimerId},
};

pub const MSG_CONNECTING: &str = "Connecting database...";
pub const MSG_ESTABLISHED: &str = "Default connection established";
pub const MSG_REESTABLISHED: &str = "Default connection re-established";
pub const MSG_LOST: &str = "Default connection lost";
pub const MSG_CONNECTION_ERROR: &str = "Connection error";
pub const MSG_MISSING_CONNECTION: &str =
    "Connection is still missing - no automatic reconnect happened - got \"disconnected\" event earlier";
pub const MSG_RECONNECT_SCHEDULED: &str = "Connection lost, reconnecting after delay";
pub const MSG_RECONNECTING: &str = "Attempting to reconnect";
pub const MSG_RECONNECT_REJECTED: &str = "Reconnect attempt rejected by driver";
pub const MSG_INITIAL_TIMEOUT: &str = "Timeout on initial connect";
pub const MSG_INITIAL_REJECTED: &str = "Initial connect failed";

/// Something the supervisor reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A lifecycle event emitted by the driver.
    Event(LifecycleEvent),
    /// The driver's initial connect call resolved.
    InitialConnectResolved,
    /// The driver's initial connect call rejected.
    InitialConnectRejected(DriverError),
    /// The initial-connect window elapsed.
    InitialConnectTimedOut(Duration),
    /// The best-effort driver close issued by manual recovery finished.
    CloseCompleted,
    /// A recovery timer elapsed.
    TimerFired(TimerId),
    /// A reconnect issued by manual recovery was rejected by the driver.
    ReconnectRejected(DriverError),
}

/// How the `connect()` future settles.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Connected,
    Rejected(DriverError),
    TimedOut(Duration),
}

/// A side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Log {
        level: Level,
        message: String,
        context: Option<Value>,
    },
    ArmTimer {
        id: TimerId,
        delay: Duration,
    },
    CancelTimer(TimerId),
    /// Close the driver handle, then feed back `Input::CloseCompleted`.
    CloseDriver,
    /// Reissue the driver connect. Only a rejection is fed back, as
    /// `Input::ReconnectRejected`.
    Reconnect,
    Settle(Settlement),
}

/// Result of one step: the next state and the effects to run, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: ConnectionState,
    pub commands: Vec<Command>,
}

impl Transition {
    fn log(&mut self, level: Level, message: &str, context: Option<Value>) {
        self.commands.push(Command::Log {
            level,
            message: message.to_string(),
            context,
        });
    }
}

/// Computes the transition for `input` under the given recovery settings.
pub fn step(state: &ConnectionState, input: Input, recovery: &RecoveryConfig) -> Transition {
    let mut next = Transition {
        state: state.clone(),
        commands: Vec::new(),
    };

    match input {
        Input::Event(LifecycleEvent::Connected) => on_success(&mut next, MSG_ESTABLISHED),
        Input::Event(LifecycleEvent::Reconnected) => on_success(&mut next, MSG_REESTABLISHED),
        Input::Event(LifecycleEvent::Disconnected) => {
            next.state.connectivity = Connectivity::Disconnected;
            next.log(Level::Warn, MSG_LOST, None);
            begin_recovery(&mut next, recovery);
        }
        Input::Event(LifecycleEvent::Error(message)) => {
            next.state.connectivity = Connectivity::Disconnected;
            next.log(
                Level::Fatal,
                MSG_CONNECTION_ERROR,
                Some(json!({ "error": message })),
            );
            if recovery.policy == RecoveryPolicy::ManualReconnect {
                begin_recovery(&mut next, recovery);
            }
        }
        Input::InitialConnectResolved => {
            if next.state.initial == InitialPhase::Pending {
                next.log(Level::Debug, "Driver connect resolved", None);
                next.state.connectivity = Connectivity::Connected;
                next.state.backoff.reset();
                clear_pending(&mut next);
                settle(&mut next, Settlement::Connected);
            }
        }
        Input::InitialConnectRejected(error) => {
            if next.state.initial == InitialPhase::Pending {
                next.state.connectivity = Connectivity::Disconnected;
                next.log(
                    Level::Error,
                    MSG_INITIAL_REJECTED,
                    Some(json!({ "error": error.to_string() })),
                );
                settle(&mut next, Settlement::Rejected(error));
            } else {
                next.log(
                    Level::Debug,
                    "Driver connect rejected after settlement",
                    Some(json!({ "error": error.to_string() })),
                );
            }
        }
        Input::InitialConnectTimedOut(window) => {
            if next.state.initial == InitialPhase::Pending {
                next.state.connectivity = Connectivity::Disconnected;
                next.log(
                    Level::Error,
                    MSG_INITIAL_TIMEOUT,
                    Some(json!({ "timeoutMs": window.as_millis() as u64 })),
                );
                settle(&mut next, Settlement::TimedOut(window));
            }
        }
        Input::CloseCompleted => match next.state.pending {
            PendingRecovery::Scheduling => {
                let id = next.state.allocate_timer();
                let delay = next.state.backoff.next_delay();
                next.state.pending = PendingRecovery::Scheduled(id);
                next.commands.push(Command::ArmTimer { id, delay });
                next.log(
                    Level::Info,
                    MSG_RECONNECT_SCHEDULED,
                    Some(json!({
                        "delaySeconds": delay.as_secs_f64(),
                        "attempt": next.state.backoff.attempt(),
                    })),
                );
            }
            PendingRecovery::Skip => {
                next.state.pending = PendingRecovery::Idle;
                next.log(
                    Level::Debug,
                    "Connection came back while closing, reconnect skipped",
                    None,
                );
            }
            PendingRecovery::Idle | PendingRecovery::Scheduled(_) => {}
        },
        Input::TimerFired(id) => {
            if next.state.pending == PendingRecovery::Scheduled(id) {
                next.state.pending = PendingRecovery::Idle;
                match recovery.policy {
                    RecoveryPolicy::SignalOnly => next.log(
                        Level::Fatal,
                        MSG_MISSING_CONNECTION,
                        Some(json!({
                            "signalDelaySeconds": recovery.missing_connection_signal_delay,
                        })),
                    ),
                    RecoveryPolicy::ManualReconnect => {
                        next.log(Level::Info, MSG_RECONNECTING, None);
                        next.commands.push(Command::Reconnect);
                    }
                }
            }
        }
        Input::ReconnectRejected(error) => {
            let context = Some(json!({ "error": error.to_string() }));
            if next.state.connectivity.is_connected() {
                next.log(
                    Level::Debug,
                    "Reconnect rejected after the connection came back",
                    context,
                );
            } else {
                next.state.connectivity = Connectivity::Disconnected;
                next.log(Level::Warn, MSG_RECONNECT_REJECTED, context);
                begin_recovery(&mut next, recovery);
            }
        }
    }

    next
}

fn on_success(next: &mut Transition, message: &str) {
    next.state.connectivity = Connectivity::Connected;
    next.log(Level::Info, message, None);
    next.state.backoff.reset();
    clear_pending(next);
    if next.state.initial == InitialPhase::Pending {
        settle(next, Settlement::Connected);
    }
}

/// Cancels whatever recovery is pending. A close in flight cannot be
/// cancelled, so it is marked `Skip` instead.
fn clear_pending(next: &mut Transition) {
    match next.state.pending {
        PendingRecovery::Idle | PendingRecovery::Skip => {}
        PendingRecovery::Scheduling => {
            next.state.pending = PendingRecovery::Skip;
            next.log(Level::Debug, "Recovery close in flight, marked to skip", None);
        }
        PendingRecovery::Scheduled(id) => {
            next.state.pending = PendingRecovery::Idle;
            next.commands.push(Command::CancelTimer(id));
            next.log(Level::Debug, "Pending recovery cancelled", None);
        }
    }
}

fn begin_recovery(next: &mut Transition, recovery: &RecoveryConfig) {
    match (recovery.policy, next.state.pending) {
        (RecoveryPolicy::SignalOnly, PendingRecovery::Idle) => {
            let id = next.state.allocate_timer();
            next.state.pending = PendingRecovery::Scheduled(id);
            next.commands.push(Command::ArmTimer {
                id,
                delay: recovery.signal_delay(),
            });
            next.log(Level::Debug, "Missing-connection signal armed", None);
        }
        (RecoveryPolicy::ManualReconnect, PendingRecovery::Idle) => {
            next.state.pending = PendingRecovery::Scheduling;
            next.commands.push(Command::CloseDriver);
            next.log(Level::Debug, "Closing driver handle before reconnect", None);
        }
        (RecoveryPolicy::ManualReconnect, PendingRecovery::Skip) => {
            // The close is still in flight; keep the attempt alive.
            next.state.pending = PendingRecovery::Scheduling;
        }
        (_, pending) => {
            next.log(
                Level::Debug,
                "Recovery already pending",
                Some(json!({ "pending": pending.to_string() })),
            );
        }
    }
}

fn settle(next: &mut Transition, settlement: Settlement) {
    next.state.initial = InitialPhase::Settled;
    next.commands.push(Command::Settle(settlement));
}
