//! In-memory runtime for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollover_core::domain::container::{ContainerDetails, ContainerSummary};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use tracing::debug;

use crate::ContainerRuntime;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
struct MockContainer {
    summary: ContainerSummary,
    started_at: DateTime<Utc>,
}

/// Mock runtime that records every call it receives
///
/// Calls are recorded as `list`, `inspect:<id>`, `stop:<id>` and `start:<id>`.
/// The same keys can be passed to [`MockRuntime::fail`] to make that call
/// return an error.
#[derive(Default)]
pub struct MockRuntime {
    containers: Mutex<Vec<MockContainer>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashSet<String>>,
    list_gate: Mutex<Option<Arc<Semaphore>>>,
    stop_gate: Mutex<Option<Arc<Semaphore>>>,
    stop_entered: Notify,
}

impl MockRuntime {
    /// Create an empty mock runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container; listing order follows insertion order.
    pub fn add_container(&self, id: &str, labels: &[(&str, &str)], started_at: DateTime<Utc>) {
        let labels: HashMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        self.containers.lock().unwrap().push(MockContainer {
            summary: ContainerSummary {
                id: id.to_string(),
                labels,
            },
            started_at,
        });
    }

    /// Removes a container, as if it was deleted out of band.
    pub fn remove_container(&self, id: &str) {
        self.containers
            .lock()
            .unwrap()
            .retain(|c| c.summary.id != id);
    }

    /// Makes the call with the given key fail until cleared.
    pub fn fail(&self, call: &str) {
        self.failures.lock().unwrap().insert(call.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Holds every subsequent `list_containers` until a permit is added to the returned gate.
    pub fn hold_lists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.list_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Holds every subsequent `stop` until a permit is added to the returned gate.
    pub fn hold_stops(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.stop_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Resolves once a `stop` call has been received.
    pub async fn stop_received(&self) {
        self.stop_entered.notified().await;
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix` (e.g. `"stop:"`).
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn pass_gate(gate: &Mutex<Option<Arc<Semaphore>>>) {
        let gate = gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn record(&self, call: String) -> Result<()> {
        let failing = self.failures.lock().unwrap().contains(&call);
        self.calls.lock().unwrap().push(call.clone());

        if failing {
            return Err(ClientError::api_error(500, format!("[MOCK] {} failed", call)));
        }
        Ok(())
    }

    fn require(&self, id: &str) -> Result<MockContainer> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.summary.id == id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Self::pass_gate(&self.list_gate).await;
        self.record("list".to_string())?;

        let containers = self.containers.lock().unwrap();
        Ok(containers.iter().map(|c| c.summary.clone()).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        self.record(format!("inspect:{}", id))?;

        let container = self.require(id)?;
        Ok(ContainerDetails {
            id: container.summary.id,
            started_at: container.started_at,
        })
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.stop_entered.notify_one();

        debug!("[MOCK] Stopping {}", id);
        Self::pass_gate(&self.stop_gate).await;

        self.record(format!("stop:{}", id))?;
        self.require(id)?;
        debug!("[MOCK] Stopped {}", id);
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.record(format!("start:{}", id))?;

        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| c.summary.id == id)
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        container.started_at = Utc::now();

        debug!("[MOCK] Started {}", id);
        Ok(())
    }
}
