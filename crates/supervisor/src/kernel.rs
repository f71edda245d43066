//! Connection kernel: runs the lifecycle machine against a live driver.
//!
//! The kernel is the single task that owns a run's [`ConnectionState`].
//! It listens to the driver's lifecycle events and to its own internal
//! completions (initial connect outcome, driver close, timers), feeds each
//! one through [`machine::step`], publishes the resulting connectivity, and
//! executes the requested commands.
//!
//! # Architecture
//!
//! ```text
//! Supervisor::connect()
//!     ↓ spawns
//! ConnectionKernel::run  ← driver events (broadcast)
//!     ↓                  ← internal inputs (mpsc): connect outcomes, close done, timers
//! machine::step (pure)
//!     ↓ commands
//! log / arm + cancel timers / close driver / reconnect / settle connect()
//! ```
//!
//! Driver calls and timers run in spawned tasks and report back through the
//! internal channel, so transitions never interleave and every completion is
//! re-validated against the state current at the time it arrives.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::{
    config::RecoveryConfig,
    driver::{Driver, LifecycleEvent},
    error::SupervisorError,
    logging::Logger,
    machine::{self, Command, Input, Settlement},
    options::TransportOptions,
    state::{ConnectionState, Connectivity, TimerId},
};

/// Sender half of the `connect()` future.
pub(crate) type SettleSender = oneshot::Sender<Result<bool, SupervisorError>>;

/// Everything a kernel needs for one run.
pub(crate) struct KernelParts {
    pub driver: Arc<dyn Driver>,
    pub uri: String,
    pub transport: TransportOptions,
    pub recovery: RecoveryConfig,
    pub initial_connect_timeout: Option<Duration>,
    pub logger: Arc<dyn Logger>,
    pub events: broadcast::Receiver<LifecycleEvent>,
    pub health_tx: watch::Sender<Connectivity>,
    pub settle_tx: SettleSender,
    pub cancel: CancellationToken,
}

pub(crate) struct ConnectionKernel {
    driver: Arc<dyn Driver>,
    uri: String,
    transport: TransportOptions,
    recovery: RecoveryConfig,
    initial_connect_timeout: Option<Duration>,
    logger: Arc<dyn Logger>,

    state: ConnectionState,

    /// Lifecycle events from the driver, subscribed before connect was issued
    events: broadcast::Receiver<LifecycleEvent>,

    /// Completions reported by spawned driver calls and timers
    inputs_tx: mpsc::UnboundedSender<Input>,
    inputs_rx: mpsc::UnboundedReceiver<Input>,

    health_tx: watch::Sender<Connectivity>,

    /// Taken on first settlement
    settle_tx: Option<SettleSender>,

    cancel: CancellationToken,

    /// The one outstanding recovery timer, if any
    recovery_timer: Option<(TimerId, CancellationToken)>,

    initial_timer: Option<CancellationToken>,
}

impl ConnectionKernel {
    pub(crate) fn new(parts: KernelParts) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        Self {
            state: ConnectionState::new(parts.recovery.backoff()),
            driver: parts.driver,
            uri: parts.uri,
            transport: parts.transport,
            recovery: parts.recovery,
            initial_connect_timeout: parts.initial_connect_timeout,
            logger: parts.logger,
            events: parts.events,
            inputs_tx,
            inputs_rx,
            health_tx: parts.health_tx,
            settle_tx: Some(parts.settle_tx),
            cancel: parts.cancel,
            recovery_timer: None,
            initial_timer: None,
        }
    }

    /// Issues the initial connect and processes inputs until cancelled or
    /// the driver's event stream closes.
    pub(crate) async fn run(mut self) {
        self.start_initial_connect();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    self.logger.debug("Supervisor run cancelled", None);
                    break;
                }

                Some(input) = self.inputs_rx.recv() => {
                    self.apply(input);
                }

                received = self.events.recv() => match received {
                    Ok(event) => self.apply(Input::Event(event)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.logger.warn(
                            "Lifecycle events were dropped",
                            Some(&json!({ "skipped": skipped })),
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.logger.error("Driver event stream closed, supervisor stopped", None);
                        // Nobody watches the connection any more.
                        self.state.connectivity = Connectivity::Disconnected;
                        self.health_tx.send_replace(Connectivity::Disconnected);
                        break;
                    }
                },
            }
        }

        // Stops every timer armed during this run.
        self.cancel.cancel();
    }

    fn start_initial_connect(&mut self) {
        let driver = self.driver.clone();
        let uri = self.uri.clone();
        let transport = self.transport.clone();
        let inputs = self.inputs_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = driver.connect(&uri, &transport) => {
                    let input = match result {
                        Ok(()) => Input::InitialConnectResolved,
                        Err(e) => Input::InitialConnectRejected(e),
                    };
                    let _ = inputs.send(input);
                }
            }
        });

        if let Some(window) = self.initial_connect_timeout {
            let token = self.spawn_timer(window, Input::InitialConnectTimedOut(window));
            self.initial_timer = Some(token);
        }
    }

    fn apply(&mut self, input: Input) {
        let transition = machine::step(&self.state, input, &self.recovery);

        let previous = self.state.connectivity;
        self.state = transition.state;
        if previous != self.state.connectivity {
            self.health_tx.send_replace(self.state.connectivity);
        }

        for command in transition.commands {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Log {
                level,
                message,
                context,
            } => self.logger.log(level, &message, context.as_ref()),
            Command::ArmTimer { id, delay } => {
                if let Some((_, previous)) = self.recovery_timer.take() {
                    previous.cancel();
                }
                let token = self.spawn_timer(delay, Input::TimerFired(id));
                self.recovery_timer = Some((id, token));
            }
            Command::CancelTimer(id) => {
                if matches!(self.recovery_timer, Some((current, _)) if current == id) {
                    if let Some((_, token)) = self.recovery_timer.take() {
                        token.cancel();
                    }
                }
            }
            Command::CloseDriver => self.close_driver(),
            Command::Reconnect => self.reconnect(),
            Command::Settle(settlement) => self.settle(settlement),
        }
    }

    /// Arms a cancellable timer that feeds `input` back when it elapses.
    fn spawn_timer(&self, delay: Duration, input: Input) -> CancellationToken {
        let token = self.cancel.child_token();
        let timer = token.clone();
        let inputs = self.inputs_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = inputs.send(input);
                }
            }
        });
        token
    }

    fn close_driver(&self) {
        let driver = self.driver.clone();
        let logger = self.logger.clone();
        let inputs = self.inputs_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = driver.close().await {
                logger.debug(
                    "Driver close failed, continuing recovery",
                    Some(&json!({ "error": e.to_string() })),
                );
            }
            let _ = inputs.send(Input::CloseCompleted);
        });
    }

    /// Success shows up as the next lifecycle event. A rejection is fed back
    /// so recovery restarts even if the driver stays silent.
    fn reconnect(&self) {
        let driver = self.driver.clone();
        let uri = self.uri.clone();
        let transport = self.transport.clone();
        let inputs = self.inputs_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = driver.connect(&uri, &transport) => {
                    if let Err(e) = result {
                        let _ = inputs.send(Input::ReconnectRejected(e));
                    }
                }
            }
        });
    }

    fn settle(&mut self, settlement: Settlement) {
        if let Some(timer) = self.initial_timer.take() {
            timer.cancel();
        }
        let Some(settle_tx) = self.settle_tx.take() else {
            return;
        };
        let outcome = match settlement {
            Settlement::Connected => Ok(true),
            Settlement::Rejected(error) => Err(SupervisorError::InitialConnectRejected(error)),
            Settlement::TimedOut(window) => Err(SupervisorError::InitialConnectTimeout(window)),
        };
        // The caller may have stopped waiting; nothing to do then.
        let _ = settle_tx.send(outcome);
    }
}
