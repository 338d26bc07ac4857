//! Service schedule registry
//!
//! The committed scheduling state shared by discovery and the rollover worker:
//! for every service, its ordered container ids and when the head container is
//! next due for a restart.
//!
//! All access goes through a single async mutex. The worker holds it for a
//! whole pass, so discovery can never rewrite a service while a restart pass is
//! iterating the schedule.

use rollover_core::domain::service::ServiceName;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::info;

/// Schedule constants shared by discovery and the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Steady-state period between restarts of the same service
    pub rollover_interval: Duration,

    /// Grace period after a (re)map before the first restart
    pub initial_debounce: Duration,

    /// Offset added per service acted upon within one pass
    pub reroll_distance: Duration,
}

impl Timing {
    /// Stagger offset for the `index`-th service acted upon in a pass
    pub fn stagger(&self, index: usize) -> Duration {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        self.reroll_distance.saturating_mul(index)
    }

    /// Due time for a service freshly (re)mapped by discovery
    pub fn remap_due(&self, now: Instant, index: usize) -> Instant {
        now + self.initial_debounce + self.stagger(index)
    }

    /// Due time for a service that was just rolled over
    pub fn rollover_due(&self, now: Instant, index: usize) -> Instant {
        now + self.rollover_interval + self.stagger(index)
    }

    /// Furthest offset from "now" any due time can get with `services` services
    ///
    /// `None` when the offset does not fit in a [`Duration`].
    pub fn horizon(&self, services: usize) -> Option<Duration> {
        let services = u32::try_from(services).ok()?;
        let spread = self.reroll_distance.checked_mul(services)?;
        self.rollover_interval
            .max(self.initial_debounce)
            .checked_add(spread)
    }
}

/// Scheduling state of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceState {
    container_ids: Vec<String>,
    next_due_at: Instant,
}

impl ServiceState {
    /// Creates a state, dropping repeated ids (first occurrence wins)
    pub fn new(container_ids: Vec<String>, next_due_at: Instant) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(container_ids.len());
        for id in container_ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        Self {
            container_ids: unique,
            next_due_at,
        }
    }

    /// Ordered container ids; the head is restarted next
    pub fn container_ids(&self) -> &[String] {
        &self.container_ids
    }

    #[cfg(test)]
    pub fn next_due_at(&self) -> Instant {
        self.next_due_at
    }

    #[cfg(test)]
    pub fn head(&self) -> Option<&str> {
        self.container_ids.first().map(String::as_str)
    }

    /// Whether the due time has strictly passed
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due_at < now
    }

    /// Pops the head, pushes it to the tail and sets a new due time
    ///
    /// Returns the head id together with the rotated state, or `None` when
    /// there is nothing to restart.
    pub fn rotated(&self, next_due_at: Instant) -> Option<(String, ServiceState)> {
        let (head, rest) = self.container_ids.split_first()?;

        let mut container_ids = rest.to_vec();
        container_ids.push(head.clone());

        Some((
            head.clone(),
            ServiceState {
                container_ids,
                next_due_at,
            },
        ))
    }

    /// Whether `candidate` holds any id this state has never seen
    ///
    /// Ids that disappeared are not drift on their own.
    pub fn has_new_members(&self, candidate: &[String]) -> bool {
        candidate.iter().any(|id| !self.container_ids.contains(id))
    }
}

/// Service to schedule mapping, iterated in service-name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    services: BTreeMap<ServiceName, ServiceState>,
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn get(&self, service: &ServiceName) -> Option<&ServiceState> {
        self.services.get(service)
    }

    #[cfg(test)]
    pub fn contains(&self, service: &ServiceName) -> bool {
        self.services.contains_key(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceName> {
        self.services.keys()
    }

    /// Replaces a service's state wholesale
    pub fn commit(&mut self, service: ServiceName, state: ServiceState) {
        self.services.insert(service, state);
    }

    pub fn remove(&mut self, service: &ServiceName) -> Option<ServiceState> {
        self.services.remove(service)
    }

    /// Commits a freshly ordered container list and resets the schedule
    ///
    /// `index` is the service's position among the services remapped in the
    /// current discovery pass; each one lands `reroll_distance` after the
    /// previous.
    pub fn remap(
        &mut self,
        timing: &Timing,
        now: Instant,
        index: usize,
        service: ServiceName,
        ordered_ids: Vec<String>,
    ) {
        let next_due_at = timing.remap_due(now, index);
        let state = ServiceState::new(ordered_ids, next_due_at);

        info!(
            "Remapped service {}: [{}] (first restart in {:?})",
            service,
            state.container_ids().join(", "),
            next_due_at.saturating_duration_since(now)
        );

        self.commit(service, state);
    }
}

/// Process-wide schedule, guarded for exclusive access
#[derive(Debug, Default)]
pub struct ScheduleRegistry {
    schedule: Mutex<Schedule>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no worker pass is active, then grants exclusive access
    pub async fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().await
    }

    /// Exclusive access if nobody holds the schedule right now
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Schedule>> {
        self.schedule.try_lock().ok()
    }

    /// Copy of the committed schedule
    #[cfg(test)]
    pub async fn snapshot(&self) -> Schedule {
        self.schedule.lock().await.clone()
    }
}
