//! Health reporting configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between periodic health log lines.
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Health log interval must be between 1 and 86400 seconds"
    ))]
    pub health_log_interval: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_log_interval: 60,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.health_log_interval)
    }
}
