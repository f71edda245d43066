//! Process-wide default supervisor.
//!
//! Applications that want a single connection reachable from anywhere
//! install one [`Supervisor`] at startup and then use [`connect`] and
//! [`is_ok`] without passing the instance around.
//!
//! ```ignore
//! connwarden_supervisor::global::install(Supervisor::new(driver, config)?);
//! connwarden_supervisor::global::connect(options).await?;
//! assert!(connwarden_supervisor::global::is_ok());
//! ```

use std::sync::OnceLock;

use super::{error::SupervisorError, options::ConnectOptions, supervisor::Supervisor};

static DEFAULT: OnceLock<Supervisor> = OnceLock::new();

/// Installs the default supervisor. Returns `false` if one was already installed.
pub fn install(supervisor: Supervisor) -> bool {
    DEFAULT.set(supervisor).is_ok()
}

pub fn get() -> Option<&'static Supervisor> {
    DEFAULT.get()
}

/// Connects the default supervisor.
pub async fn connect(options: ConnectOptions) -> Result<bool, SupervisorError> {
    match DEFAULT.get() {
        Some(supervisor) => supervisor.connect(options).await,
        None => Err(SupervisorError::NotInstalled),
    }
}

/// Health of the default connection; `false` when nothing is installed.
pub fn is_ok() -> bool {
    DEFAULT.get().is_some_and(Supervisor::is_ok)
}
