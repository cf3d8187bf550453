//! Data model shared by the decision engine and its collaborators.
//!
//! Every value here lives for a single run. Nothing is cached between
//! runs; the store's applied throughput is re-read at the start of each.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AutoscaleError, AutoscaleResult};

/// Identity of the single collection being autoscaled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Database account name.
    pub account: String,
    /// Database id within the account.
    pub database: String,
    /// Collection id within the database.
    pub collection: String,
}

impl ResourceId {
    pub fn new(account: &str, database: &str, collection: &str) -> Self {
        Self {
            account: account.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.database, self.collection)
    }
}

/// Partition layout and provisioned throughput, read fresh each run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTopology {
    pub id: ResourceId,
    /// Store-internal address of the collection (e.g. `dbs/{rid}/colls/{rid}/`),
    /// when the topology reader resolves one. The metrics gateway needs it
    /// to address the monitoring API.
    pub self_link: Option<String>,
    /// Number of physical partitions. Always at least 1.
    pub partition_count: u32,
    /// Aggregate provisioned throughput across all partitions.
    pub current_throughput: u64,
}

impl ResourceTopology {
    /// Build a topology, rejecting a zero partition count.
    pub fn new(
        id: ResourceId,
        partition_count: u32,
        current_throughput: u64,
    ) -> AutoscaleResult<Self> {
        if partition_count == 0 {
            return Err(AutoscaleError::TopologyUnavailable(format!(
                "{id} reported zero partitions"
            )));
        }
        Ok(Self {
            id,
            self_link: None,
            partition_count,
            current_throughput,
        })
    }

    pub fn with_self_link(mut self, link: impl Into<String>) -> Self {
        self.self_link = Some(link.into());
        self
    }

    /// Throughput available to a single partition (integer truncation).
    pub fn per_partition_throughput(&self) -> u64 {
        self.current_throughput / u64::from(self.partition_count.max(1))
    }
}

/// One aggregated utilization bucket from the monitoring backend.
///
/// Only `timestamp` and `maximum` drive decisions; the other fields are
/// carried through for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub count: Option<i64>,
}

impl MetricSample {
    /// A sample carrying only a peak value.
    pub fn peak(timestamp: DateTime<Utc>, maximum: f64) -> Self {
        Self {
            timestamp,
            maximum: Some(maximum),
            average: None,
            minimum: None,
            total: None,
            last: None,
            count: None,
        }
    }
}

/// Samples for one monitored dimension over the trailing window, in the
/// order the gateway returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub dimension: String,
    pub unit: Option<String>,
    pub samples: Vec<MetricSample>,
}

impl MetricSeries {
    pub fn new(dimension: &str, samples: Vec<MetricSample>) -> Self {
        Self {
            dimension: dimension.to_string(),
            unit: None,
            samples,
        }
    }
}

/// Which configured bound a candidate target was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Min,
    Max,
}

/// Allowed throughput range and scale-down step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputPolicy {
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

impl ThroughputPolicy {
    /// Build a policy, enforcing `min <= max` and `step > 0`.
    pub fn new(min: u64, max: u64, step: u64) -> AutoscaleResult<Self> {
        if min > max {
            return Err(AutoscaleError::InvalidConfiguration(format!(
                "minThroughput {min} exceeds maxThroughput {max}"
            )));
        }
        if step == 0 {
            return Err(AutoscaleError::InvalidConfiguration(
                "throughputStep must be greater than zero".to_string(),
            ));
        }
        Ok(Self { min, max, step })
    }

    /// Clamp a candidate into `[min, max]`, reporting which bound was hit.
    pub fn clamp(&self, candidate: u64) -> (u64, Option<Limit>) {
        if candidate > self.max {
            (self.max, Some(Limit::Max))
        } else if candidate < self.min {
            (self.min, Some(Limit::Min))
        } else {
            (candidate, None)
        }
    }

    pub fn contains(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Outcome of one signal evaluation. Targets are absolute aggregate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleDecision {
    NoChange,
    Increase(u64),
    Decrease(u64),
}

impl ScaleDecision {
    pub fn target(&self) -> Option<u64> {
        match self {
            ScaleDecision::NoChange => None,
            ScaleDecision::Increase(t) | ScaleDecision::Decrease(t) => Some(*t),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScaleDecision::NoChange => "no_change",
            ScaleDecision::Increase(_) => "increase",
            ScaleDecision::Decrease(_) => "decrease",
        }
    }
}

/// How the engine treats a run that shows both a busy sample and headroom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalResolution {
    /// Busy and over-provisioned signals act independently: an increase
    /// and a decrease may both be applied in the same run, in that order.
    #[default]
    Independent,
    /// A busy signal suppresses the decrease for that run.
    BusyWins,
}

impl FromStr for SignalResolution {
    type Err = AutoscaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "independent" => Ok(SignalResolution::Independent),
            "busy-wins" | "busy_wins" => Ok(SignalResolution::BusyWins),
            other => Err(AutoscaleError::InvalidConfiguration(format!(
                "unknown signal resolution: {other}"
            ))),
        }
    }
}

/// Opaque bearer credential for the monitoring API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}
