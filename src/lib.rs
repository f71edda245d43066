//! connwarden: keeps one database connection observable and recoverable
//!
//! This crate wires the `connwarden-supervisor` library into a long-running
//! process: it loads configuration, sets up logging, supervises the
//! connection through a TCP reachability driver and exposes readiness.
//!
//! ## Modules
//!
//! * `config`: Configuration structures, loading and validation. TOML
//!   files validated with the `validator` crate.
//!
//! * `core`: Runtime components:
//!   - TCP reachability driver
//!   - Readiness state management
//!   - Periodic health reporting
//!
//! * `logger`: Logging initialization using `tracing`. Console output in
//!   compact, pretty or JSON format and optional systemd journald output.

pub mod config;
pub mod core;
pub mod logger;

pub use connwarden_supervisor as supervisor;
