//! Supervisor configuration.
//!
//! All types deserialize with serde (TOML in the shipped binary) and carry
//! `validator` constraints, so bad settings fail at load time rather than at
//! the first disconnect.
//!
//! # Examples
//!
//! ```toml
//! db_uri = "mongodb://db.internal:27017/app"
//! initial_connect_timeout = 30
//! debug = false
//!
//! [recovery]
//! policy = "manual_reconnect"
//! reconnect_delay = 30
//! max_reconnect_delay = 300
//! backoff_multiplier = 1.5
//!
//! [transport]
//! socketTimeoutMS = 45000
//! maxPoolSize = 10
//! ```

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

use crate::{backoff::Backoff, options::ConnectOptions};

/// Main supervisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Database URI handed to the driver.
    #[validate(length(min = 1, message = "Database URI must not be empty"))]
    pub db_uri: String,

    /// Initial-connect window in seconds. `0` disables the timeout.
    #[validate(range(
        max = 3600,
        message = "Initial connect timeout must be between 0 and 3600 seconds"
    ))]
    pub initial_connect_timeout: u64,

    /// Enables verbose driver tracing.
    pub debug: bool,

    /// What to do when the connection is lost after the initial connect.
    #[validate(nested)]
    pub recovery: RecoveryConfig,

    /// Driver tuning, passed through to the driver after merging with defaults.
    pub transport: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_uri: "mongodb://localhost:27017".to_string(),
            initial_connect_timeout: 30,
            debug: false,
            recovery: RecoveryConfig::default(),
            transport: Map::new(),
        }
    }
}

impl Config {
    /// The initial-connect window, `None` when disabled.
    pub fn initial_connect_timeout(&self) -> Option<Duration> {
        match self.initial_connect_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Builds the connect options this configuration describes.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.db_uri.clone())
            .with_debug(self.debug)
            .with_transport_map(self.transport.clone())
    }
}

/// How steady-state connection loss is remediated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Trust the driver to reconnect; log one fatal signal if it does not
    /// within `missing_connection_signal_delay`.
    #[default]
    SignalOnly,

    /// Close the driver handle and reissue connect after `reconnect_delay`.
    ManualReconnect,
}

impl fmt::Display for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPolicy::SignalOnly => write!(f, "signal-only"),
            RecoveryPolicy::ManualReconnect => write!(f, "manual-reconnect"),
        }
    }
}

/// Recovery scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_reconnect_delays"))]
pub struct RecoveryConfig {
    pub policy: RecoveryPolicy,

    /// Seconds to wait before the first manual reconnect.
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Reconnect delay must be between 1 and 3600 seconds"
    ))]
    pub reconnect_delay: u64,

    /// Cap in seconds for the growing reconnect delay.
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Max reconnect delay must be between 1 and 86400 seconds"
    ))]
    pub max_reconnect_delay: u64,

    /// Growth factor between consecutive manual reconnects. `1.0` keeps it constant.
    #[validate(range(
        min = 1.0,
        max = 10.0,
        message = "Backoff multiplier must be between 1.0 and 10.0"
    ))]
    pub backoff_multiplier: f64,

    /// Seconds after a disconnect before the missing-connection signal fires.
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Missing connection signal delay must be between 1 and 86400 seconds"
    ))]
    pub missing_connection_signal_delay: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            policy: RecoveryPolicy::default(),
            reconnect_delay: 30,
            max_reconnect_delay: 300,
            backoff_multiplier: 1.0,
            missing_connection_signal_delay: 120,
        }
    }
}

impl RecoveryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.reconnect_delay),
            Duration::from_secs(self.max_reconnect_delay),
            self.backoff_multiplier,
        )
    }

    pub fn signal_delay(&self) -> Duration {
        Duration::from_secs(self.missing_connection_signal_delay)
    }
}

fn validate_reconnect_delays(config: &RecoveryConfig) -> Result<(), ValidationError> {
    if config.max_reconnect_delay < config.reconnect_delay {
        return Err(ValidationError::new("max_below_initial").with_message(
            "Max reconnect delay must not be smaller than the reconnect delay".into(),
        ));
    }
    Ok(())
}
