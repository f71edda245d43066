//! The connection supervisor.
//!
//! A [`Supervisor`] owns one logical database connection made through a
//! [`Driver`]. `connect()` resolves the options, subscribes to the driver's
//! lifecycle events, spawns the connection kernel and waits for the first
//! outcome. From then on the kernel keeps the published health up to date
//! and runs the configured recovery policy in the background.
//!
//! ```ignore
//! let supervisor = Supervisor::new(driver, Config::default())?;
//! supervisor
//!     .connect(ConnectOptions::new("mongodb://localhost:27017/app"))
//!     .await?;
//!
//! if !supervisor.is_ok() {
//!     // report unhealthy
//! }
//! ```

use std::sync::Arc;

use serde_json::{json, Map};
use tokio::{
    sync::{oneshot, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use validator::Validate;

use super::{
    config::Config,
    driver::Driver,
    error::SupervisorError,
    kernel::{ConnectionKernel, KernelParts},
    logging::{Logger, TracingLogger},
    machine::MSG_CONNECTING,
    options::{resolve_transport_options, ConnectOptions},
    state::Connectivity,
};

/// Value of the `package` field attached to every supervisor log record.
pub const PACKAGE_NAME: &str = "connwarden";

const MSG_DEBUG_ENABLED: &str =
    "Database debug mode is enabled, expect verbose driver output and degraded performance";

/// Supervises a single database connection.
///
/// Cheap to clone; clones share the same run and health.
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    driver: Arc<dyn Driver>,
    config: Config,

    /// Latest connectivity, written by the kernel and read by `is_ok()`
    health_tx: watch::Sender<Connectivity>,

    /// The active run, if `connect()` was called since the last reset
    run: Mutex<Option<Run>>,
}

#[derive(Debug)]
struct Run {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Supervisor {
    /// Creates a supervisor for `driver`. Fails if `config` does not validate.
    pub fn new(driver: Arc<dyn Driver>, config: Config) -> Result<Self, SupervisorError> {
        config.validate()?;
        let (health_tx, _) = watch::channel(Connectivity::Unknown);
        Ok(Self {
            inner: Arc::new(Inner {
                driver,
                config,
                health_tx,
                run: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Connects using the options described by the supervisor's own config.
    pub async fn connect_configured(&self) -> Result<bool, SupervisorError> {
        self.connect(self.inner.config.connect_options()).await
    }

    /// Opens the supervised connection.
    ///
    /// Resolves to `Ok(true)` on the first success (a `connected` or
    /// `reconnected` event, or the driver's connect call resolving). Fails
    /// with [`SupervisorError::InitialConnectRejected`] if the driver rejects
    /// first, or [`SupervisorError::InitialConnectTimeout`] if nothing
    /// settles within the configured window. Whatever happens afterwards
    /// only changes health and logs.
    ///
    /// An empty `db_uri` falls back to the configured one.
    pub async fn connect(&self, options: ConnectOptions) -> Result<bool, SupervisorError> {
        let settle_rx = {
            let mut run = self.inner.run.lock().await;
            if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
                return Err(SupervisorError::AlreadyStarted);
            }

            let transport = resolve_transport_options(&options);
            let logger = scoped_logger(&options);
            logger.info(MSG_CONNECTING, None);

            if options.debug {
                logger.warn(MSG_DEBUG_ENABLED, None);
                self.inner.driver.set_debug(true);
            }

            let uri = if options.db_uri.is_empty() {
                self.inner.config.db_uri.clone()
            } else {
                options.db_uri.clone()
            };

            // Subscribe before connect is issued so no early event is missed.
            let events = self.inner.driver.subscribe();
            let (settle_tx, settle_rx) = oneshot::channel();
            let cancel = CancellationToken::new();

            self.inner.health_tx.send_replace(Connectivity::Unknown);

            let kernel = ConnectionKernel::new(KernelParts {
                driver: self.inner.driver.clone(),
                uri,
                transport,
                recovery: self.inner.config.recovery.clone(),
                initial_connect_timeout: self.inner.config.initial_connect_timeout(),
                logger,
                events,
                health_tx: self.inner.health_tx.clone(),
                settle_tx,
                cancel: cancel.clone(),
            });
            let task = tokio::spawn(kernel.run());
            *run = Some(Run { cancel, task });

            settle_rx
        };

        match settle_rx.await {
            Ok(outcome) => outcome,
            // The run was reset before anything settled.
            Err(_) => Err(SupervisorError::Stopped),
        }
    }

    /// True iff the last observed lifecycle state is connected.
    ///
    /// Never fails; `false` before any event was seen.
    pub fn is_ok(&self) -> bool {
        self.inner.health_tx.borrow().is_connected()
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.inner.health_tx.borrow()
    }

    /// Watch receiver over connectivity changes.
    pub fn subscribe_health(&self) -> watch::Receiver<Connectivity> {
        self.inner.health_tx.subscribe()
    }

    /// Stops the current run, cancels every pending timer and forgets the
    /// observed health. A fresh `connect()` is allowed afterwards.
    ///
    /// A `connect()` still waiting for its outcome fails with
    /// [`SupervisorError::Stopped`].
    pub async fn reset(&self) {
        let run = self.inner.run.lock().await.take();
        if let Some(run) = run {
            run.cancel.cancel();
            if let Err(e) = run.task.await {
                warn!("Connection kernel ended abnormally: {}", e);
            }
        }
        self.inner.health_tx.send_replace(Connectivity::Unknown);
        debug!("Supervisor reset");
    }

    /// Resets the supervisor and closes the driver handle (best effort).
    pub async fn shutdown(&self) {
        self.reset().await;
        if let Err(e) = self.inner.driver.close().await {
            warn!("Driver close during shutdown failed: {}", e);
        }
    }
}

/// The caller's logger, or the tracing logger, tagged with the package name.
fn scoped_logger(options: &ConnectOptions) -> Arc<dyn Logger> {
    let base: Arc<dyn Logger> = match &options.logger {
        Some(logger) => logger.clone(),
        None => Arc::new(TracingLogger::new()),
    };
    let mut fields = Map::new();
    fields.insert("package".to_string(), json!(PACKAGE_NAME));
    base.child(fields)
}
