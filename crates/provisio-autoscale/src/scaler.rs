//! Autoscaler: one run per trigger, applied against the collaborators.
//!
//! A run reads the topology, selects the metric window, authenticates,
//! fetches samples, asks the engine for decisions, and applies them in
//! order. The first error aborts the run; the next trigger is the retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use provisio_core::{
    AutoscaleConfig, AutoscaleResult, MetricWindow, ResourceTopology, ScaleDecision,
};

use crate::collaborators::Collaborators;
use crate::engine::{ScalePlan, evaluate};
use crate::stats::RunStats;

/// A decision and what the store reported after applying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedChange {
    pub decision: ScaleDecision,
    /// `None` in dry-run mode.
    pub applied: Option<u64>,
}

/// Everything a completed run observed and did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub topology: ResourceTopology,
    pub window: MetricWindow,
    pub plan: ScalePlan,
    pub applied: Vec<AppliedChange>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Another run held the guard.
    Skipped,
}

/// Runs the control loop for one resource.
pub struct Autoscaler {
    config: AutoscaleConfig,
    collaborators: Collaborators,
    stats: Arc<RunStats>,
    dry_run: bool,
    /// Held for the duration of a run; runs never overlap.
    guard: Mutex<()>,
}

impl Autoscaler {
    pub fn new(config: AutoscaleConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            stats: Arc::new(RunStats::new()),
            dry_run: false,
            guard: Mutex::new(()),
        }
    }

    /// Evaluate and log decisions without applying them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &AutoscaleConfig {
        &self.config
    }

    /// Shared handle to the run counters.
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Run once, using the current time for window selection.
    pub async fn run_once(&self) -> AutoscaleResult<RunOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Run once as if triggered at `now`.
    ///
    /// Returns `Skipped` without touching any collaborator when another
    /// run is in flight.
    pub async fn run_at(&self, now: DateTime<Utc>) -> AutoscaleResult<RunOutcome> {
        let Ok(_guard) = self.guard.try_lock() else {
            warn!(resource = %self.config.resource, "previous run still in flight; trigger skipped");
            self.stats.record_skipped();
            return Ok(RunOutcome::Skipped);
        };

        self.stats.record_started();
        match self.execute(now).await {
            Ok(report) => {
                self.stats.record_success();
                Ok(RunOutcome::Completed(report))
            }
            Err(e) => {
                error!(
                    resource = %self.config.resource,
                    kind = e.kind(),
                    error = %e,
                    "autoscale run failed"
                );
                self.stats.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn execute(&self, now: DateTime<Utc>) -> AutoscaleResult<RunReport> {
        let resource = &self.config.resource;
        info!(%resource, triggered_at = %now, "autoscale run started");

        let topology = self.collaborators.topology.get_topology(resource).await?;
        info!(
            %resource,
            partitions = topology.partition_count,
            provisioned = topology.current_throughput,
            per_partition = topology.per_partition_throughput(),
            "topology read"
        );
        self.stats
            .record_topology(topology.partition_count, topology.current_throughput);

        let window = self.config.window.window_ending_at(now);
        let token = self.collaborators.tokens.get_access_token().await?;
        let series = self
            .collaborators
            .metrics
            .get_series(&topology, &self.config.metric, &window, &token)
            .await?;
        debug!(
            %resource,
            metric = %self.config.metric,
            start = %window.start,
            end = %window.end,
            series = series.len(),
            samples = series.iter().map(|s| s.samples.len()).sum::<usize>(),
            "metric window fetched"
        );

        let plan = evaluate(
            &topology,
            &series,
            &self.config.policy,
            self.config.resolution,
        );

        let mut applied = Vec::with_capacity(plan.decisions.len());
        for decision in &plan.decisions {
            let Some(target) = decision.target() else {
                continue;
            };
            if self.dry_run {
                info!(%resource, decision = decision.label(), target, "dry run; not applied");
                applied.push(AppliedChange {
                    decision: *decision,
                    applied: None,
                });
                continue;
            }

            let value = self
                .collaborators
                .capacity
                .apply_throughput(resource, target)
                .await?;
            if value != target {
                warn!(%resource, target, applied = value, "store reports a different throughput");
            }
            info!(%resource, decision = decision.label(), applied = value, "throughput applied");
            self.stats.record_applied(*decision, value);
            applied.push(AppliedChange {
                decision: *decision,
                applied: Some(value),
            });
        }

        info!(%resource, changes = applied.len(), "autoscale run completed");
        Ok(RunReport {
            topology,
            window,
            plan,
            applied,
        })
    }

    /// Run on the configured interval until shutdown.
    ///
    /// The first run starts immediately. Failures are logged and counted;
    /// the loop keeps going.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let interval = self.config.interval;
        info!(
            resource = %self.config.resource,
            interval_secs = interval.as_secs(),
            dry_run = self.dry_run,
            "autoscaler started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Errors are already logged and counted by run_at.
                    let _ = self.run_once().await;
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use provisio_core::{
        AutoscaleError, MetricSample, MetricSeries, ResourceId, ThroughputPolicy,
    };

    use crate::memory::InMemoryStore;

    fn config(min: u64, max: u64, step: u64) -> AutoscaleConfig {
        AutoscaleConfig::new(
            ResourceId::new("acct", "db", "coll"),
            ThroughputPolicy::new(min, max, step).unwrap(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn peaks(values: &[f64]) -> MetricSeries {
        MetricSeries::new(
            "Max RUs Per Second",
            values
                .iter()
                .map(|v| MetricSample::peak(now(), *v))
                .collect(),
        )
    }

    #[tokio::test]
    async fn applies_decrease_on_idle_collection() {
        let store = Arc::new(InMemoryStore::new(1, 1000));
        store.set_series(vec![peaks(&[200.0])]);
        let scaler = Autoscaler::new(config(400, 10_000, 100), Collaborators::single(store.clone()));

        let outcome = scaler.run_at(now()).await.unwrap();
        let RunOutcome::Completed(report) = outcome else {
            panic!("run should complete");
        };

        assert_eq!(report.plan.primary(), ScaleDecision::Decrease(900));
        assert_eq!(store.throughput(), 900);
        assert_eq!(scaler.stats().snapshot().scale_downs, 1);
    }

    #[tokio::test]
    async fn window_uses_config() {
        let store = Arc::new(InMemoryStore::new(1, 1000));
        let scaler = Autoscaler::new(config(400, 10_000, 100), Collaborators::single(store.clone()));
        scaler.run_at(now()).await.unwrap();

        let windows = store.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());
        assert_eq!(windows[0].end, Utc.with_ymd_and_hms(2024, 5, 1, 11, 50, 0).unwrap());
    }

    #[tokio::test]
    async fn dry_run_applies_nothing() {
        let store = Arc::new(InMemoryStore::new(4, 4000));
        store.set_series(vec![peaks(&[5000.0])]);
        let scaler = Autoscaler::new(config(400, 100_000, 100), Collaborators::single(store.clone()))
            .with_dry_run(true);

        let RunOutcome::Completed(report) = scaler.run_at(now()).await.unwrap() else {
            panic!("run should complete");
        };
        assert_eq!(report.plan.decisions, vec![ScaleDecision::Increase(20_000)]);
        assert_eq!(report.applied.len(), 1);
        assert!(report.applied.iter().all(|c| c.applied.is_none()));
        assert!(store.applies().is_empty());
        assert_eq!(store.throughput(), 4000);
    }

    #[tokio::test]
    async fn auth_failure_aborts_before_metrics() {
        let store = Arc::new(InMemoryStore::new(1, 1000));
        store.fail_auth(true);
        let scaler = Autoscaler::new(config(400, 10_000, 100), Collaborators::single(store.clone()));

        let err = scaler.run_at(now()).await.unwrap_err();
        assert!(matches!(err, AutoscaleError::AuthFailed(_)));
        assert!(store.windows().is_empty());
        assert!(store.applies().is_empty());
        assert_eq!(scaler.stats().snapshot().runs_failed, 1);
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let store = Arc::new(InMemoryStore::new(1, 1000));
        let scaler = Autoscaler::new(config(400, 10_000, 100), Collaborators::single(store.clone()));

        let held = scaler.guard.lock().await;
        let outcome = scaler.run_at(now()).await.unwrap();
        drop(held);

        assert!(matches!(outcome, RunOutcome::Skipped));
        assert!(store.applies().is_empty());
        assert_eq!(scaler.stats().snapshot().runs_skipped, 1);
        assert_eq!(scaler.stats().snapshot().runs_started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_until_shutdown() {
        let store = Arc::new(InMemoryStore::new(1, 1000));
        let mut cfg = config(400, 10_000, 100);
        cfg.interval = std::time::Duration::from_secs(300);
        let scaler = Arc::new(Autoscaler::new(cfg, Collaborators::single(store.clone())));

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = {
            let scaler = Arc::clone(&scaler);
            tokio::spawn(async move { scaler.run(rx).await })
        };

        // First tick fires immediately, then one per interval.
        tokio::time::sleep(std::time::Duration::from_secs(301)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(scaler.stats().snapshot().runs_started, 2);
    }
}
