//! In-memory collaborators for tests and offline simulation.
//!
//! `InMemoryStore` plays every external role at once. Applied throughput
//! feeds back into the next topology read, so consecutive runs behave
//! like they would against a real store.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use provisio_core::{
    AccessToken, AutoscaleError, AutoscaleResult, MetricSeries, MetricWindow, ResourceId,
    ResourceTopology,
};

use crate::collaborators::{CapacityController, MetricsGateway, TokenProvider, TopologyReader};

/// One `apply_throughput` call as the store saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyRecord {
    pub target: u64,
    /// False when the target was already in effect.
    pub changed: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    partition_count: u32,
    throughput: u64,
    series: Vec<MetricSeries>,
    applies: Vec<ApplyRecord>,
    windows: Vec<MetricWindow>,
    fail_topology: bool,
    fail_auth: bool,
    fail_metrics: bool,
    /// Applies accepted before every further apply is rejected.
    accept_applies: Option<usize>,
}

/// A single collection held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new(partition_count: u32, throughput: u64) -> Self {
        Self {
            state: Mutex::new(StoreState {
                partition_count,
                throughput,
                ..StoreState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the series returned by every metrics query.
    pub fn set_series(&self, series: Vec<MetricSeries>) {
        self.lock().series = series;
    }

    pub fn set_partition_count(&self, partition_count: u32) {
        self.lock().partition_count = partition_count;
    }

    pub fn fail_topology(&self, fail: bool) {
        self.lock().fail_topology = fail;
    }

    pub fn fail_auth(&self, fail: bool) {
        self.lock().fail_auth = fail;
    }

    pub fn fail_metrics(&self, fail: bool) {
        self.lock().fail_metrics = fail;
    }

    /// Accept the next `n` applies, then reject the rest.
    pub fn accept_applies(&self, n: usize) {
        self.lock().accept_applies = Some(n);
    }

    pub fn throughput(&self) -> u64 {
        self.lock().throughput
    }

    pub fn applies(&self) -> Vec<ApplyRecord> {
        self.lock().applies.clone()
    }

    /// Windows requested from the metrics gateway, in call order.
    pub fn windows(&self) -> Vec<MetricWindow> {
        self.lock().windows.clone()
    }
}

#[async_trait]
impl TopologyReader for InMemoryStore {
    async fn get_topology(&self, resource: &ResourceId) -> AutoscaleResult<ResourceTopology> {
        let state = self.lock();
        if state.fail_topology {
            return Err(AutoscaleError::TopologyUnavailable(format!(
                "{resource}: injected failure"
            )));
        }
        ResourceTopology::new(resource.clone(), state.partition_count, state.throughput)
            .map(|t| t.with_self_link(format!("memory/{}/{}/", resource.database, resource.collection)))
    }
}

#[async_trait]
impl TokenProvider for InMemoryStore {
    async fn get_access_token(&self) -> AutoscaleResult<AccessToken> {
        if self.lock().fail_auth {
            return Err(AutoscaleError::AuthFailed("injected failure".to_string()));
        }
        Ok(AccessToken::new("in-memory"))
    }
}

#[async_trait]
impl MetricsGateway for InMemoryStore {
    async fn get_series(
        &self,
        topology: &ResourceTopology,
        metric: &str,
        window: &MetricWindow,
        _token: &AccessToken,
    ) -> AutoscaleResult<Vec<MetricSeries>> {
        let mut state = self.lock();
        state.windows.push(*window);
        if state.fail_metrics {
            return Err(AutoscaleError::MetricsUnavailable(format!(
                "{}: {metric}: injected failure",
                topology.id
            )));
        }
        Ok(state.series.clone())
    }
}

#[async_trait]
impl CapacityController for InMemoryStore {
    async fn apply_throughput(&self, resource: &ResourceId, target: u64) -> AutoscaleResult<u64> {
        let mut state = self.lock();
        if let Some(remaining) = state.accept_applies {
            if remaining == 0 {
                return Err(AutoscaleError::CapacityApplyFailed {
                    target,
                    reason: format!("{resource}: injected rejection"),
                });
            }
            state.accept_applies = Some(remaining - 1);
        }

        let changed = state.throughput != target;
        state.throughput = target;
        state.applies.push(ApplyRecord { target, changed });
        debug!(%resource, target, changed, "in-memory throughput applied");
        Ok(state.throughput)
    }

    async fn current_throughput(&self, _resource: &ResourceId) -> AutoscaleResult<u64> {
        Ok(self.lock().throughput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> ResourceId {
        ResourceId::new("acct", "db", "coll")
    }

    #[tokio::test]
    async fn reapplying_same_target_is_noop() {
        let store = InMemoryStore::new(1, 400);

        let first = store.apply_throughput(&resource(), 800).await.unwrap();
        let second = store.apply_throughput(&resource(), 800).await.unwrap();

        assert_eq!(first, 800);
        assert_eq!(second, 800);
        assert_eq!(store.current_throughput(&resource()).await.unwrap(), 800);
        assert_eq!(
            store.applies(),
            vec![
                ApplyRecord { target: 800, changed: true },
                ApplyRecord { target: 800, changed: false },
            ]
        );
    }

    #[tokio::test]
    async fn topology_reflects_applied_throughput() {
        let store = InMemoryStore::new(2, 400);
        store.apply_throughput(&resource(), 1200).await.unwrap();

        let topo = store.get_topology(&resource()).await.unwrap();
        assert_eq!(topo.current_throughput, 1200);
        assert_eq!(topo.per_partition_throughput(), 600);
    }

    #[tokio::test]
    async fn zero_partitions_is_topology_unavailable() {
        let store = InMemoryStore::new(0, 400);
        let err = store.get_topology(&resource()).await.unwrap_err();
        assert!(matches!(err, AutoscaleError::TopologyUnavailable(_)));
    }

    #[tokio::test]
    async fn rejects_after_accept_budget() {
        let store = InMemoryStore::new(1, 400);
        store.accept_applies(1);

        assert!(store.apply_throughput(&resource(), 500).await.is_ok());
        let err = store.apply_throughput(&resource(), 600).await.unwrap_err();
        assert!(matches!(err, AutoscaleError::CapacityApplyFailed { target: 600, .. }));
        assert_eq!(store.throughput(), 500);
    }
}
