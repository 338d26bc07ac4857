//! Discovery loop
//!
//! Polls the runtime for containers belonging to allow-listed services and
//! keeps the schedule registry's membership current. On the first populated
//! pass every service is mapped; afterwards only services whose container set
//! gained an id are remapped. Each remap resets the service's schedule, with
//! successive services in a pass staggered by the reroll distance.

use anyhow::{Context, Result};
use rollover_client::ContainerRuntime;
use rollover_core::domain::container::ContainerSummary;
use rollover_core::domain::service::{ServiceAllowList, ServiceName};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::scheduler::ordering::order_by_age;
use crate::scheduler::registry::{Schedule, ScheduleRegistry, Timing};

/// Candidate membership: services in first-seen order, ids in listing order
pub type Candidates = Vec<(ServiceName, Vec<String>)>;

/// What a single discovery pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Services remapped this pass, in remap order
    pub remapped: Vec<ServiceName>,

    /// Services dropped because they have no running containers
    pub pruned: Vec<ServiceName>,
}

/// Keeps the registry's service membership in sync with the runtime
pub struct DiscoveryLoop {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<ScheduleRegistry>,
    services: ServiceAllowList,
    service_label: String,
    timing: Timing,
    interval: Duration,
    prune_missing: bool,

    /// Stale services already warned about, so the warning is not repeated every poll
    reported_stale: Mutex<HashSet<ServiceName>>,
}

impl DiscoveryLoop {
    pub fn new(
        config: &Config,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<ScheduleRegistry>,
    ) -> Self {
        Self {
            runtime,
            registry,
            services: config.services.clone(),
            service_label: config.service_label.clone(),
            timing: config.timing(),
            interval: config.discovery_interval,
            prune_missing: config.prune_missing_services,
            reported_stale: Mutex::new(HashSet::new()),
        }
    }

    /// Runs discovery passes forever
    ///
    /// A failed pass is logged and retried on the next tick.
    pub async fn run(&self) {
        info!(
            "Starting discovery loop (interval: {:?}, services: {})",
            self.interval, self.services
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match self.discover_once().await {
                Ok(report) => {
                    if !report.remapped.is_empty() || !report.pruned.is_empty() {
                        debug!(
                            "Discovery remapped {} and pruned {} service(s)",
                            report.remapped.len(),
                            report.pruned.len()
                        );
                    }
                }
                Err(e) => {
                    error!("Error during discovery pass: {:#}", e);
                }
            }
        }
    }

    /// Performs a single discovery pass
    ///
    /// Waits for any in-flight worker pass to finish before listing, but does
    /// not hold the registry while talking to the runtime. Drift is checked
    /// again against the committed state right before each remap is applied,
    /// so a worker commit that lands in between is never overwritten by a
    /// stale decision.
    pub async fn discover_once(&self) -> Result<DiscoveryReport> {
        drop(self.registry.lock().await);

        let containers = self
            .runtime
            .list_containers()
            .await
            .context("Failed to list containers")?;

        let candidates = self.group_candidates(&containers);
        debug!(
            "Discovered {} container(s) across {} managed service(s)",
            containers.len(),
            candidates.len()
        );

        let changed: Candidates = {
            let schedule = self.registry.lock().await;
            let first_run = schedule.is_empty();
            candidates
                .iter()
                .filter(|(service, ids)| first_run || Self::has_drifted(&schedule, service, ids))
                .cloned()
                .collect()
        };

        let mut ordered: Candidates = Vec::with_capacity(changed.len());
        for (service, ids) in changed {
            let ids = order_by_age(&self.runtime, ids)
                .await
                .with_context(|| format!("Failed to order containers of service {}", service))?;
            ordered.push((service, ids));
        }

        let mut schedule = self.registry.lock().await;
        let first_run = schedule.is_empty();
        let now = Instant::now();
        let mut report = DiscoveryReport::default();

        for (service, ids) in ordered {
            if !first_run && !Self::has_drifted(&schedule, &service, &ids) {
                continue;
            }
            if !first_run {
                info!("Container set of service {} changed", service);
            }

            let index = report.remapped.len();
            schedule.remap(&self.timing, now, index, service.clone(), ids);
            report.remapped.push(service);
        }

        report.pruned = self.handle_missing(&mut schedule, &candidates);

        Ok(report)
    }

    /// Groups listed containers by allow-listed service label
    pub fn group_candidates(&self, containers: &[ContainerSummary]) -> Candidates {
        let mut candidates: Candidates = Vec::new();

        for container in containers {
            let Some(service) = container
                .label(&self.service_label)
                .and_then(|value| self.services.resolve(value))
            else {
                continue;
            };

            match candidates.iter_mut().find(|(s, _)| s == service) {
                Some((_, ids)) => {
                    if !ids.contains(&container.id) {
                        ids.push(container.id.clone());
                    }
                }
                None => candidates.push((service.clone(), vec![container.id.clone()])),
            }
        }

        candidates
    }

    /// A service drifts when the runtime reports an id it has not committed
    ///
    /// A service that only appears after the first populated pass has an
    /// empty committed set, so all of its ids count as new.
    fn has_drifted(schedule: &Schedule, service: &ServiceName, ids: &[String]) -> bool {
        match schedule.get(service) {
            Some(state) => state.has_new_members(ids),
            None => !ids.is_empty(),
        }
    }

    /// Deals with committed services that no longer have running containers
    fn handle_missing(&self, schedule: &mut Schedule, candidates: &Candidates) -> Vec<ServiceName> {
        let missing: Vec<ServiceName> = schedule
            .services()
            .filter(|service| !candidates.iter().any(|(s, _)| s == *service))
            .cloned()
            .collect();

        let mut reported = self
            .reported_stale
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reported.retain(|service| missing.contains(service));

        if self.prune_missing {
            for service in &missing {
                info!("Pruning service {}: no running containers", service);
                schedule.remove(service);
            }
            return missing;
        }

        for service in &missing {
            if reported.insert(service.clone()) {
                warn!(
                    "Service {} has no running containers, keeping its schedule",
                    service
                );
            }
        }

        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::worker::{PassOutcome, RolloverWorker};
    use chrono::{TimeZone, Utc};
    use rollover_client::MockRuntime;

    const LABEL: &str = "com.docker.compose.service";

    fn config(services: &str) -> Config {
        let mut config = Config::new(ServiceAllowList::from_csv(services));
        config.initial_debounce = Duration::from_secs(300);
        config.reroll_distance = Duration::from_secs(300);
        config
    }

    fn started(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, minute, 0).unwrap()
    }

    fn setup(config: &Config) -> (Arc<MockRuntime>, Arc<ScheduleRegistry>, DiscoveryLoop) {
        let mock = Arc::new(MockRuntime::new());
        let registry = Arc::new(ScheduleRegistry::new());
        let discovery = DiscoveryLoop::new(config, mock.clone(), Arc::clone(&registry));
        (mock, registry, discovery)
    }

    fn name(raw: &str) -> ServiceName {
        ServiceName::parse(raw).unwrap()
    }

    fn ids(schedule: &Schedule, service: &str) -> Vec<String> {
        schedule.get(&name(service)).unwrap().container_ids().to_vec()
    }

    #[test]
    fn test_group_candidates() {
        let (_, _, discovery) = setup(&config("api,worker"));
        let summary = |id: &str, service: Option<&str>| ContainerSummary {
            id: id.to_string(),
            labels: service
                .map(|s| [(LABEL.to_string(), s.to_string())].into_iter().collect())
                .unwrap_or_default(),
        };

        let candidates = discovery.group_candidates(&[
            summary("w1", Some("Worker")),
            summary("a1", Some("api")),
            summary("db1", Some("db")),
            summary("x", None),
            summary("w2", Some("worker")),
            summary("w1", Some("worker")),
        ]);

        assert_eq!(
            candidates,
            vec![
                (name("worker"), vec!["w1".to_string(), "w2".to_string()]),
                (name("api"), vec!["a1".to_string()]),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_seeds_staggered_schedule() {
        let (mock, registry, discovery) = setup(&config("api,worker"));
        mock.add_container("w1", &[(LABEL, "worker")], started(0));
        mock.add_container("a2", &[(LABEL, "api")], started(9));
        mock.add_container("a1", &[(LABEL, "API")], started(3));

        let now = Instant::now();
        let report = discovery.discover_once().await.unwrap();
        assert_eq!(report.remapped, vec![name("worker"), name("api")]);

        let schedule = registry.snapshot().await;
        assert_eq!(ids(&schedule, "api"), vec!["a1", "a2"]);
        assert_eq!(ids(&schedule, "worker"), vec!["w1"]);

        let worker_due = schedule.get(&name("worker")).unwrap().next_due_at();
        let api_due = schedule.get(&name("api")).unwrap().next_due_at();
        assert_eq!(worker_due, now + Duration::from_secs(300));
        assert_eq!(api_due - worker_due, Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_membership_keeps_schedule() {
        let (mock, registry, discovery) = setup(&config("api"));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        discovery.discover_once().await.unwrap();
        let before = registry.snapshot().await;

        time::advance(Duration::from_secs(60)).await;
        let report = discovery.discover_once().await.unwrap();

        assert!(report.remapped.is_empty());
        assert_eq!(registry.snapshot().await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_member_triggers_remap() {
        let (mock, registry, discovery) = setup(&config("api"));
        mock.add_container("a", &[(LABEL, "api")], started(10));
        mock.add_container("b", &[(LABEL, "api")], started(20));
        discovery.discover_once().await.unwrap();

        time::advance(Duration::from_secs(120)).await;
        mock.remove_container("b");
        mock.add_container("c", &[(LABEL, "api")], started(5));

        let now = Instant::now();
        let report = discovery.discover_once().await.unwrap();
        assert_eq!(report.remapped, vec![name("api")]);

        let schedule = registry.snapshot().await;
        let state = schedule.get(&name("api")).unwrap();
        assert_eq!(state.container_ids(), ["c".to_string(), "a".to_string()]);
        assert_eq!(state.next_due_at(), now + Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_member_alone_is_not_drift() {
        let (mock, registry, discovery) = setup(&config("api"));
        mock.add_container("a", &[(LABEL, "api")], started(10));
        mock.add_container("b", &[(LABEL, "api")], started(20));
        discovery.discover_once().await.unwrap();

        mock.remove_container("b");
        let report = discovery.discover_once().await.unwrap();

        assert!(report.remapped.is_empty());
        assert_eq!(ids(&registry.snapshot().await, "api"), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_services_are_indexed_among_themselves() {
        let (mock, registry, discovery) = setup(&config("api,web,worker"));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        mock.add_container("w1", &[(LABEL, "web")], started(0));
        mock.add_container("k1", &[(LABEL, "worker")], started(0));
        discovery.discover_once().await.unwrap();

        time::advance(Duration::from_secs(30)).await;
        mock.add_container("a2", &[(LABEL, "api")], started(1));
        mock.add_container("k2", &[(LABEL, "worker")], started(1));

        let now = Instant::now();
        let report = discovery.discover_once().await.unwrap();
        assert_eq!(report.remapped, vec![name("api"), name("worker")]);

        let schedule = registry.snapshot().await;
        assert_eq!(
            schedule.get(&name("api")).unwrap().next_due_at(),
            now + Duration::from_secs(300)
        );
        assert_eq!(
            schedule.get(&name("worker")).unwrap().next_due_at(),
            now + Duration::from_secs(600)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_service_is_mapped() {
        let (mock, registry, discovery) = setup(&config("api,worker"));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        discovery.discover_once().await.unwrap();

        mock.add_container("k1", &[(LABEL, "worker")], started(0));
        let report = discovery.discover_once().await.unwrap();

        assert_eq!(report.remapped, vec![name("worker")]);
        assert_eq!(ids(&registry.snapshot().await, "worker"), vec!["k1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_service_is_kept_by_default() {
        let (mock, registry, discovery) = setup(&config("api,worker"));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        mock.add_container("k1", &[(LABEL, "worker")], started(0));
        discovery.discover_once().await.unwrap();

        mock.remove_container("k1");
        let report = discovery.discover_once().await.unwrap();

        assert!(report.pruned.is_empty());
        assert!(registry.snapshot().await.contains(&name("worker")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_service_is_pruned_when_enabled() {
        let mut config = config("api,worker");
        config.prune_missing_services = true;
        let (mock, registry, discovery) = setup(&config);
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        mock.add_container("k1", &[(LABEL, "worker")], started(0));
        discovery.discover_once().await.unwrap();

        mock.remove_container("k1");
        let report = discovery.discover_once().await.unwrap();

        assert_eq!(report.pruned, vec![name("worker")]);
        let schedule = registry.snapshot().await;
        assert!(!schedule.contains(&name("worker")));
        assert!(schedule.contains(&name("api")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_failure_leaves_registry_untouched() {
        let (mock, registry, discovery) = setup(&config("api"));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        mock.fail("list");

        assert!(discovery.discover_once().await.is_err());
        assert!(registry.snapshot().await.is_empty());

        mock.clear_failures();
        discovery.discover_once().await.unwrap();
        assert_eq!(registry.snapshot().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspection_failure_aborts_pass() {
        let (mock, registry, discovery) = setup(&config("api"));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        mock.fail("inspect:a1");

        let err = discovery.discover_once().await.unwrap_err();
        assert!(format!("{:#}", err).contains("api"));
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_listing_does_not_block_worker() {
        let mut config = config("api");
        config.initial_debounce = Duration::ZERO;
        let (mock, registry, discovery) = setup(&config);
        let worker = RolloverWorker::new(&config, mock.clone(), Arc::clone(&registry));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        discovery.discover_once().await.unwrap();

        let _gate = mock.hold_lists();
        let discovery = Arc::new(discovery);
        let stuck = tokio::spawn({
            let discovery = Arc::clone(&discovery);
            async move { discovery.discover_once().await }
        });
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(!stuck.is_finished());

        let mut outcomes = Vec::new();
        for _ in 0..5 {
            time::advance(Duration::from_secs(2)).await;
            outcomes.push(worker.run_pass().await.unwrap());
        }

        assert!(!outcomes.contains(&PassOutcome::Busy));
        assert_eq!(outcomes[0], PassOutcome::Completed { restarted: vec![name("api")] });
        assert_eq!(mock.count("stop:a1"), 1);
        assert_eq!(mock.count("list"), 1);

        stuck.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remap_does_not_override_worker_commit() {
        let mut config = config("api");
        config.initial_debounce = Duration::ZERO;
        let (mock, registry, discovery) = setup(&config);
        let worker = RolloverWorker::new(&config, mock.clone(), Arc::clone(&registry));
        mock.add_container("a", &[(LABEL, "api")], started(1));
        mock.add_container("b", &[(LABEL, "api")], started(2));
        discovery.discover_once().await.unwrap();

        // Discovery lists the same membership, but the worker commits a
        // rotation before discovery gets the registry back
        let gate = mock.hold_lists();
        let discovery = Arc::new(discovery);
        let pass = tokio::spawn({
            let discovery = Arc::clone(&discovery);
            async move { discovery.discover_once().await }
        });
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        time::advance(Duration::from_secs(1)).await;
        let outcome = worker.run_pass().await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed { restarted: vec![name("api")] });
        let rotated = registry.snapshot().await;

        gate.add_permits(1);
        let report = pass.await.unwrap().unwrap();

        assert!(report.remapped.is_empty());
        assert_eq!(registry.snapshot().await, rotated);
        assert_eq!(ids(&rotated, "api"), vec!["b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_failed_passes() {
        let (mock, registry, discovery) = setup(&config("api"));
        mock.add_container("a1", &[(LABEL, "api")], started(0));
        mock.fail("list");

        let discovery = Arc::new(discovery);
        let handle = tokio::spawn({
            let discovery = Arc::clone(&discovery);
            async move { discovery.run().await }
        });

        // Passes at 0s, 5s and 10s all fail without touching the registry
        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(mock.count("list"), 3);
        assert!(registry.snapshot().await.is_empty());

        mock.clear_failures();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(mock.count("list"), 4);
        assert_eq!(ids(&registry.snapshot().await, "api"), vec!["a1"]);

        handle.abort();
    }
}
