//! Contracts for the external systems a run talks to.
//!
//! Implementations live in `provisio-azure` (real services) and
//! [`crate::memory`] (tests and simulation). Every call is awaited in
//! sequence by the run; none is retried.

use std::sync::Arc;

use async_trait::async_trait;

use provisio_core::{
    AccessToken, AutoscaleResult, MetricSeries, MetricWindow, ResourceId, ResourceTopology,
};

/// Resolves the collection and its current partition layout.
#[async_trait]
pub trait TopologyReader: Send + Sync {
    /// Fails with `TopologyUnavailable`.
    async fn get_topology(&self, resource: &ResourceId) -> AutoscaleResult<ResourceTopology>;
}

/// Issues bearer credentials for the monitoring API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fails with `AuthFailed`.
    async fn get_access_token(&self) -> AutoscaleResult<AccessToken>;
}

/// Reads utilization samples for a window.
#[async_trait]
pub trait MetricsGateway: Send + Sync {
    /// One series per dimension the backend returns for `metric`.
    /// Fails with `MetricsUnavailable`.
    async fn get_series(
        &self,
        topology: &ResourceTopology,
        metric: &str,
        window: &MetricWindow,
        token: &AccessToken,
    ) -> AutoscaleResult<Vec<MetricSeries>>;
}

/// Applies and reads back aggregate throughput.
///
/// Applying the value that is already in effect must be a no-op that
/// returns that value.
#[async_trait]
pub trait CapacityController: Send + Sync {
    /// Apply `target` and return the value the store reports afterwards.
    /// Fails with `CapacityApplyFailed`.
    async fn apply_throughput(&self, resource: &ResourceId, target: u64) -> AutoscaleResult<u64>;

    async fn current_throughput(&self, resource: &ResourceId) -> AutoscaleResult<u64>;
}

/// The four collaborators a run needs, bundled for the autoscaler.
#[derive(Clone)]
pub struct Collaborators {
    pub topology: Arc<dyn TopologyReader>,
    pub tokens: Arc<dyn TokenProvider>,
    pub metrics: Arc<dyn MetricsGateway>,
    pub capacity: Arc<dyn CapacityController>,
}

impl Collaborators {
    /// Use one object for every role.
    pub fn single<S>(store: Arc<S>) -> Self
    where
        S: TopologyReader + TokenProvider + MetricsGateway + CapacityController + 'static,
    {
        Self {
            topology: store.clone(),
            tokens: store.clone(),
            metrics: store.clone(),
            capacity: store,
        }
    }
}
