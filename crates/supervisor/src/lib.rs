//! # connwarden-supervisor: reconnect-aware supervision of one database connection
//!
//! The supervisor sits between an application and its database driver. It
//! opens the single default connection, listens to the driver's lifecycle
//! events, keeps an always-answerable health flag, and remediates
//! steady-state connection loss according to a configurable policy:
//!
//! - **Option resolution**: caller transport options merged over built-in
//!   defaults, with URI and logger fields stripped
//! - **Initial connect** that settles exactly once: success, driver
//!   rejection, or timeout
//! - **Health probe**: `is_ok()` is a synchronous, never-failing read
//! - **Recovery**: signal-only (log a fatal signal if the driver does not
//!   come back) or manual reconnect (close, wait, reconnect with backoff)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use connwarden_supervisor::{Config, ConnectOptions, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> connwarden_supervisor::Result<()> {
//!     let supervisor = Supervisor::new(Arc::new(MyDriver::new()), Config::default())?;
//!
//!     supervisor
//!         .connect(
//!             ConnectOptions::new("mongodb://db.internal:27017/app")
//!                 .with_transport("socketTimeoutMS", 45_000),
//!         )
//!         .await?;
//!
//!     println!("healthy: {}", supervisor.is_ok());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │     Supervisor / global              │
//! │ connect(), is_ok(), reset()          │
//! └────────────┬─────────────────────────┘
//!              │ spawns one run
//! ┌────────────▼─────────────────────────┐
//! │     ConnectionKernel                 │
//! │ events, timers, driver calls         │
//! └────────────┬─────────────────────────┘
//!              │ inputs / commands
//! ┌────────────▼─────────────────────────┐
//! │     machine::step (pure)             │
//! │ ConnectionState, PendingRecovery     │
//! └────────────┬─────────────────────────┘
//!              │
//! ┌────────────▼─────────────────────────┐
//! │     Driver trait                     │
//! │ connect, close, lifecycle events     │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! ```text
//! Unknown ──(connected / connect resolved)──> Connected
//!    │                                           │
//!    │                          (disconnected / error)
//!    │                                           ▼
//!    └──(timeout / rejected / error)──────> Disconnected
//!                                                │
//!                                   (recovery per policy)
//!                                                │
//!                              (reconnected) ────┘──> Connected
//! ```

pub mod backoff;
pub mod config;
pub mod driver;
pub mod error;
pub mod global;
mod kernel;
pub mod logging;
pub mod machine;
pub mod options;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod testing;

// Re-exports: Configuration
pub use config::{Config, RecoveryConfig, RecoveryPolicy};
// Re-exports: Driver collaborator
pub use driver::{Driver, LifecycleEvent};
// Re-exports: Error handling
pub use error::{DriverError, SupervisorError};
// Re-exports: Logging collaborator
pub use logging::{Level, Logger, TracingLogger};
// Re-exports: Options
pub use options::{resolve_transport_options, ConnectOptions, TransportOptions};
// Re-exports: State monitoring
pub use state::{Connectivity, PendingRecovery};
pub use supervisor::Supervisor;

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
