//! Runner configuration
//!
//! Defines every parameter the runner reads at startup: which services to
//! manage, how to reach the container runtime, and the schedule constants.
//! Configuration is read once and never changes afterwards.

use rollover_client::RuntimeEndpoint;
use rollover_core::domain::service::ServiceAllowList;
use std::time::Duration;

use crate::scheduler::Timing;

/// Label the runtime puts on compose-managed containers
pub const DEFAULT_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Engine API port used when only a host is configured
pub const DEFAULT_RUNTIME_PORT: u16 = 2375;

/// Upper bound on how far ahead a restart may be scheduled
pub const MAX_SCHEDULE_HORIZON: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Services this runner is allowed to restart
    pub services: ServiceAllowList,

    /// Container label whose value names the owning service
    pub service_label: String,

    /// Engine API host (e.g., "10.0.0.5")
    pub runtime_host: Option<String>,

    /// Engine API port
    pub runtime_port: Option<u16>,

    /// CLI binary used when neither host nor port is configured
    pub runtime_cli: String,

    /// Steady-state period between restarts of a service
    pub rollover_interval: Duration,

    /// Grace period before a (re)mapped service's first restart
    pub initial_debounce: Duration,

    /// Offset between consecutive services acted upon in one pass
    pub reroll_distance: Duration,

    /// How often the runtime is polled for container membership
    pub discovery_interval: Duration,

    /// How often the rollover worker wakes up
    pub worker_tick: Duration,

    /// Drop schedule entries for services with no running containers
    pub prune_missing_services: bool,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(services: ServiceAllowList) -> Self {
        Self {
            services,
            service_label: DEFAULT_SERVICE_LABEL.to_string(),
            runtime_host: None,
            runtime_port: None,
            runtime_cli: "docker".to_string(),
            rollover_interval: Duration::from_secs(30 * 60),
            initial_debounce: Duration::from_secs(5 * 60),
            reroll_distance: Duration::from_secs(5 * 60),
            discovery_interval: Duration::from_secs(5),
            worker_tick: Duration::from_secs(2),
            prune_missing_services: false,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ROLLOVER_SERVICES (required, comma-separated, case-insensitive)
    /// - ROLLOVER_SERVICE_LABEL (optional, default: com.docker.compose.service)
    /// - RUNTIME_HOST / RUNTIME_PORT (optional, Engine API endpoint)
    /// - RUNTIME_CLI (optional, default: docker)
    /// - ROLLOVER_INTERVAL_SECS (optional, default: 1800)
    /// - ROLLOVER_DEBOUNCE_SECS (optional, default: 300)
    /// - ROLLOVER_REROLL_DISTANCE_SECS (optional, default: 300)
    /// - ROLLOVER_DISCOVERY_INTERVAL_SECS (optional, default: 5)
    /// - ROLLOVER_WORKER_TICK_MILLIS (optional, default: 2000)
    /// - ROLLOVER_PRUNE_MISSING (optional, default: false)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let services = lookup("ROLLOVER_SERVICES")
            .map(|csv| ServiceAllowList::from_csv(&csv))
            .ok_or_else(|| anyhow::anyhow!("ROLLOVER_SERVICES environment variable not set"))?;

        let mut config = Self::new(services);

        if let Some(label) = lookup("ROLLOVER_SERVICE_LABEL").filter(|l| !l.trim().is_empty()) {
            config.service_label = label.trim().to_string();
        }

        config.runtime_host = lookup("RUNTIME_HOST").filter(|h| !h.trim().is_empty());
        config.runtime_port = lookup("RUNTIME_PORT").and_then(|s| s.trim().parse::<u16>().ok());

        if let Some(cli) = lookup("RUNTIME_CLI").filter(|c| !c.trim().is_empty()) {
            config.runtime_cli = cli.trim().to_string();
        }

        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        config.rollover_interval = secs("ROLLOVER_INTERVAL_SECS", config.rollover_interval);
        config.initial_debounce = secs("ROLLOVER_DEBOUNCE_SECS", config.initial_debounce);
        config.reroll_distance = secs("ROLLOVER_REROLL_DISTANCE_SECS", config.reroll_distance);
        config.discovery_interval =
            secs("ROLLOVER_DISCOVERY_INTERVAL_SECS", config.discovery_interval);

        config.worker_tick = lookup("ROLLOVER_WORKER_TICK_MILLIS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(config.worker_tick);

        config.prune_missing_services = lookup("ROLLOVER_PRUNE_MISSING")
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.services.is_empty() {
            anyhow::bail!("ROLLOVER_SERVICES must name at least one service");
        }

        if self.service_label.is_empty() {
            anyhow::bail!("service_label cannot be empty");
        }

        if self.runtime_port == Some(0) {
            anyhow::bail!("runtime_port must be greater than 0");
        }

        if self.discovery_interval.is_zero() {
            anyhow::bail!("discovery_interval must be greater than 0");
        }

        if self.worker_tick.is_zero() {
            anyhow::bail!("worker_tick must be greater than 0");
        }

        match self.timing().horizon(self.services.len()) {
            Some(horizon) if horizon <= MAX_SCHEDULE_HORIZON => {}
            _ => anyhow::bail!(
                "rollover_interval, initial_debounce and reroll_distance schedule restarts more than {} days ahead",
                MAX_SCHEDULE_HORIZON.as_secs() / 86_400
            ),
        }

        Ok(())
    }

    /// Schedule constants shared by discovery and the worker
    pub fn timing(&self) -> Timing {
        Timing {
            rollover_interval: self.rollover_interval,
            initial_debounce: self.initial_debounce,
            reroll_distance: self.reroll_distance,
        }
    }

    /// Engine API when a host or port is set, the local CLI otherwise
    pub fn runtime_endpoint(&self) -> RuntimeEndpoint {
        if self.runtime_host.is_none() && self.runtime_port.is_none() {
            return RuntimeEndpoint::Cli {
                program: self.runtime_cli.clone(),
            };
        }

        RuntimeEndpoint::Engine {
            host: self
                .runtime_host
                .clone()
                .unwrap_or_else(|| "localhost".to_string()),
            port: self.runtime_port.unwrap_or(DEFAULT_RUNTIME_PORT),
        }
    }
}
