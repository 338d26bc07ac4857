//! Rollover Runner
//!
//! Performs unattended, staggered rolling restarts of the containers that
//! belong to a fixed set of services, so long-running processes are refreshed
//! periodically without taking a whole service down at once.
//!
//! Architecture:
//! - Configuration: services and schedule constants from the environment
//! - Runtime client: Engine API over TCP, or the local CLI
//! - Scheduler: discovery loop + rollover worker sharing one schedule registry
//!
//! The runner keeps no state across restarts: every start is a first run and
//! the registry is rebuilt from what the runtime reports.

mod config;
mod scheduler;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::{DiscoveryLoop, RolloverWorker, ScheduleRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollover_runner=info,rollover_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rollover Runner");

    // Load configuration; there is no usable default without a service list
    let config = load_config()?;
    info!(
        "Loaded configuration: services={}, label={}, runtime={}",
        config.services,
        config.service_label,
        config.runtime_endpoint()
    );
    if config.prune_missing_services {
        info!("Services without running containers will be pruned from the schedule");
    }

    // Initialize runtime client
    let runtime = rollover_client::connect(&config.runtime_endpoint());
    info!("Container runtime client initialized");

    let registry = Arc::new(ScheduleRegistry::new());
    let discovery = DiscoveryLoop::new(&config, Arc::clone(&runtime), Arc::clone(&registry));
    let worker = RolloverWorker::new(&config, runtime, registry);

    info!("Runner initialized successfully");

    tokio::select! {
        _ = discovery.run() => {
            error!("Discovery loop exited unexpectedly");
        }
        _ = worker.run() => {
            error!("Rollover worker exited unexpectedly");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, exiting");
        }
    }

    Ok(())
}

/// Loads and validates configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
