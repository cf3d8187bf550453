//! Error taxonomy for an autoscale run.
//!
//! Every variant is terminal for the run that raised it. The next
//! scheduled run is the only retry.

use thiserror::Error;

/// Result type alias for autoscale operations.
pub type AutoscaleResult<T> = Result<T, AutoscaleError>;

/// Errors that abort an autoscale run.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("topology unavailable: {0}")]
    TopologyUnavailable(String),

    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("failed to apply throughput {target}: {reason}")]
    CapacityApplyFailed { target: u64, reason: String },

    #[error("configuration missing or non-numeric: {0}")]
    ConfigurationMissing(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl AutoscaleError {
    /// Short stable label, used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AutoscaleError::TopologyUnavailable(_) => "topology_unavailable",
            AutoscaleError::MetricsUnavailable(_) => "metrics_unavailable",
            AutoscaleError::AuthFailed(_) => "auth_failed",
            AutoscaleError::CapacityApplyFailed { .. } => "capacity_apply_failed",
            AutoscaleError::ConfigurationMissing(_) => "configuration_missing",
            AutoscaleError::InvalidConfiguration(_) => "invalid_configuration",
        }
    }
}
