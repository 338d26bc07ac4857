//! Rollover worker
//!
//! Wakes on a fixed tick and restarts the head container of every service
//! whose due time has passed, one service at a time. The restarted container
//! moves to the tail of its service's list and the service gets a new due time,
//! staggered against the other services restarted in the same pass.

use anyhow::{Context, Result};
use rollover_client::ContainerRuntime;
use rollover_core::domain::service::ServiceName;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::scheduler::registry::{ScheduleRegistry, Timing};

/// Result of one worker tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another holder had the registry; nothing was evaluated
    Busy,

    /// The pass ran; lists the services restarted, in order
    Completed { restarted: Vec<ServiceName> },
}

/// Periodically restarts due containers
pub struct RolloverWorker {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<ScheduleRegistry>,
    timing: Timing,
    tick: Duration,
}

impl RolloverWorker {
    pub fn new(
        config: &Config,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<ScheduleRegistry>,
    ) -> Self {
        Self {
            runtime,
            registry,
            timing: config.timing(),
            tick: config.worker_tick,
        }
    }

    /// Runs the worker forever
    ///
    /// Ticks missed while a long pass runs are skipped, never queued.
    pub async fn run(&self) {
        info!(
            "Starting rollover worker (tick: {:?}, interval: {:?}, debounce: {:?}, reroll distance: {:?})",
            self.tick,
            self.timing.rollover_interval,
            self.timing.initial_debounce,
            self.timing.reroll_distance
        );

        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match self.run_pass().await {
                Ok(PassOutcome::Busy) => {
                    debug!("Registry busy, skipping rollover tick");
                }
                Ok(PassOutcome::Completed { restarted }) => {
                    if !restarted.is_empty() {
                        info!("Rolled over {} service(s) this pass", restarted.len());
                    }
                }
                Err(e) => {
                    error!("Rollover pass aborted: {:#}", e);
                }
            }
        }
    }

    /// Performs a single rollover pass
    ///
    /// Returns [`PassOutcome::Busy`] without doing anything if the registry is
    /// already held. Otherwise the registry stays locked for the whole pass and
    /// is released on every exit path, including errors. A failed stop/start
    /// aborts the rest of the pass and leaves that service's schedule as it
    /// was, so it is retried on the next tick.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let Some(mut schedule) = self.registry.try_lock() else {
            return Ok(PassOutcome::Busy);
        };

        let now = Instant::now();
        let services: Vec<ServiceName> = schedule.services().cloned().collect();
        let mut restarted = Vec::new();

        for service in services {
            let Some(state) = schedule.get(&service) else {
                continue;
            };

            if !state.is_due(now) {
                continue;
            }

            let next_due_at = self.timing.rollover_due(now, restarted.len());
            let Some((container_id, rotated)) = state.rotated(next_due_at) else {
                debug!("Service {} is due but has no containers", service);
                continue;
            };

            info!("Stopping container {} of service {}", container_id, service);
            self.runtime
                .stop(&container_id)
                .await
                .with_context(|| {
                    format!("Failed to stop container {} of service {}", container_id, service)
                })?;

            self.runtime
                .start(&container_id)
                .await
                .with_context(|| {
                    format!("Failed to start container {} of service {}", container_id, service)
                })?;
            info!(
                "Started container {} of service {} (next rollover in {:?})",
                container_id,
                service,
                next_due_at.saturating_duration_since(now)
            );

            schedule.commit(service.clone(), rotated);
            restarted.push(service);
        }

        Ok(PassOutcome::Completed { restarted })
    }
}
