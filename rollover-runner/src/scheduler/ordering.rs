//! Container age ordering
//!
//! Before a container set is committed it is put into a deterministic order so
//! round-robin rotation is reproducible: oldest start time first, ties broken
//! by id. Inspections run concurrently and are awaited together.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rollover_client::ContainerRuntime;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

/// Orders container ids oldest-first by their inspected start time
///
/// Any failed inspection fails the whole ordering; the remaining inspections
/// are aborted.
pub async fn order_by_age(
    runtime: &Arc<dyn ContainerRuntime>,
    ids: Vec<String>,
) -> Result<Vec<String>> {
    let mut inspections = JoinSet::new();

    for id in ids {
        let runtime = Arc::clone(runtime);
        inspections.spawn(async move {
            let details = runtime.inspect(&id).await;
            (id, details)
        });
    }

    let mut aged = Vec::with_capacity(inspections.len());
    while let Some(joined) = inspections.join_next().await {
        let (id, details) = joined.context("Container inspection task failed")?;
        let details = details.with_context(|| format!("Failed to inspect container {}", id))?;
        debug!("Container {} started at {}", id, details.started_at);
        aged.push((id, details.started_at));
    }

    Ok(sort_oldest_first(aged))
}

/// Sorts `(id, started_at)` pairs by start time, then id
fn sort_oldest_first(mut aged: Vec<(String, DateTime<Utc>)>) -> Vec<String> {
    aged.sort_by(|(a_id, a_started), (b_id, b_started)| {
        a_started.cmp(b_started).then_with(|| a_id.cmp(b_id))
    });
    aged.into_iter().map(|(id, _)| id).collect()
}
