use std::{
    process,
    sync::{Arc, OnceLock},
};

use connwarden::{
    config::Config,
    core::{monitor::HealthMonitor, readiness::Readiness, tcp::TcpDriver},
    logger::LoggerManager,
    print_error,
    supervisor::{global, Supervisor},
};
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting connwarden version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    info!("Recovery policy: {}", cfg.supervisor.recovery.policy);
    debug!("{:#?}", cfg.supervisor);

    let supervisor = Supervisor::new(Arc::new(TcpDriver::new()), cfg.supervisor.clone())
        .unwrap_or_else(|e| {
            error!("Failed to create supervisor: {}", e);
            process::exit(1);
        });
    if !global::install(supervisor.clone()) {
        error!("Default supervisor was already installed");
        process::exit(1);
    }

    let readiness = Readiness::default();
    readiness.start_listening(supervisor.subscribe_health());

    if let Err(e) = global::connect(cfg.supervisor.connect_options()).await {
        error!("Failed to connect database: {}", e);
        process::exit(1);
    }
    info!("Database connection supervised (healthy: {})", global::is_ok());

    let monitor = HealthMonitor::new(
        supervisor.clone(),
        readiness.clone(),
        cfg.monitor.interval(),
    );

    tokio::select! {
        _ = monitor.run() => {
            error!("Health monitor unexpectedly finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
            supervisor.shutdown().await;
            debug!("Supervisor stopped, driver closed");
            info!("Shutdown complete");
        }
    }
    Ok(())
}
