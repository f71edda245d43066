//! Periodic health reporting.
//!
//! The `HealthMonitor` waits until the process reports ready, then logs the
//! supervisor's health at a fixed interval so long-running deployments leave
//! a trail even when nothing changes.

use connwarden_supervisor::Supervisor;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{info, warn};

use super::readiness::Readiness;

/// How long to wait for readiness before repeating the "still waiting" warning.
const READINESS_NAG: Duration = Duration::from_secs(30);

pub struct HealthMonitor {
    supervisor: Supervisor,
    readiness: Readiness,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(supervisor: Supervisor, readiness: Readiness, interval: Duration) -> Self {
        Self {
            supervisor,
            readiness,
            interval,
        }
    }

    /// Runs until the task is dropped.
    pub async fn run(self) {
        self.wait_ready().await;

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Health reporting started (interval: {}s)",
            self.interval.as_secs()
        );

        loop {
            ticker.tick().await;
            let connectivity = self.supervisor.connectivity();
            if self.supervisor.is_ok() {
                info!("Database health: {}", connectivity);
            } else {
                warn!(
                    "Database health: {} (readiness: {})",
                    connectivity,
                    self.readiness.current_state()
                );
            }
        }
    }

    async fn wait_ready(&self) {
        let mut rx = self.readiness.subscribe();
        if rx.borrow().is_ready() {
            return;
        }
        warn!("Waiting for readiness... Current: {}", *rx.borrow());
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let state = rx.borrow().clone();
                    if state.is_ready() {
                        info!("Process is ready");
                        return;
                    }
                    warn!("Still not ready: {}", state);
                }
                _ = sleep(READINESS_NAG) => {
                    warn!("Still waiting for readiness... Current: {}", *rx.borrow());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use connwarden_supervisor::Config;

    use super::*;
    use crate::core::{readiness::ReadinessState, tcp::TcpDriver};

    #[tokio::test(start_paused = true)]
    async fn test_monitor_waits_for_readiness() {
        let supervisor = Supervisor::new(Arc::new(TcpDriver::new()), Config::default()).unwrap();
        let readiness = Readiness::new();
        let monitor = HealthMonitor::new(supervisor, readiness.clone(), Duration::from_secs(60));
        let task = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(!task.is_finished());

        readiness.set_state(ReadinessState::Ready);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!task.is_finished());
        task.abort();
    }
}
