//! Decision engine: turns one run's topology and samples into targets.
//!
//! The engine is pure: it performs no I/O and holds no state between
//! calls. The autoscaler applies the returned decisions in order.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use provisio_core::{
    Limit, MetricSample, MetricSeries, ResourceTopology, ScaleDecision, SignalResolution,
    ThroughputPolicy,
};

/// How the over-provisioned determination was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Headroom {
    /// No sample has shown headroom yet; the collection is treated as
    /// over-provisioned until evidence says otherwise.
    Assumed,
    /// At least one sample peaked below the per-partition throughput.
    Observed,
}

/// Starting headroom for every assessment. A window with no busy sample
/// therefore still produces a scale-down.
const INITIAL_HEADROOM: Option<Headroom> = Some(Headroom::Assumed);

/// The sample that marked the collection busy.
#[derive(Debug, Clone, PartialEq)]
pub struct BusySignal {
    pub dimension: String,
    pub observed_at: DateTime<Utc>,
    pub peak: f64,
    /// `trunc(peak) * partition_count`, before clamping.
    pub candidate: u64,
}

/// Signal state accumulated while scanning a run's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub partition_count: u32,
    pub per_partition: u64,
    /// Set by the last series that contained a busy sample.
    pub busy: Option<BusySignal>,
    /// Cleared by a busy sample; a later sample below the per-partition
    /// throughput sets it again.
    pub headroom: Option<Headroom>,
}

impl Assessment {
    pub fn new(topology: &ResourceTopology) -> Self {
        Self {
            partition_count: topology.partition_count,
            per_partition: topology.per_partition_throughput(),
            busy: None,
            headroom: INITIAL_HEADROOM,
        }
    }

    /// Scan one series. Stops at the first busy sample.
    pub fn observe_series(&mut self, series: &MetricSeries) {
        for sample in &series.samples {
            if self.observe(&series.dimension, sample) {
                break;
            }
        }
    }

    /// Fold one sample in. Returns true when the sample marked the
    /// collection busy.
    fn observe(&mut self, dimension: &str, sample: &MetricSample) -> bool {
        let Some(peak) = sample.maximum else {
            debug!(%dimension, timestamp = %sample.timestamp, "sample has no maximum; skipped");
            return false;
        };
        let per_partition = self.per_partition as f64;
        debug!(
            %dimension,
            peak,
            per_partition = self.per_partition,
            "comparing peak to per-partition throughput"
        );

        if peak > per_partition {
            let candidate = (peak as u64).saturating_mul(u64::from(self.partition_count));
            info!(
                %dimension,
                peak,
                timestamp = %sample.timestamp,
                "partition throughput exceeded provisioned"
            );
            self.busy = Some(BusySignal {
                dimension: dimension.to_string(),
                observed_at: sample.timestamp,
                peak,
                candidate,
            });
            self.headroom = None;
            return true;
        }
        if per_partition > peak {
            self.headroom = Some(Headroom::Observed);
        }
        false
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn is_over_provisioned(&self) -> bool {
        self.headroom.is_some()
    }
}

/// Decisions for one run, in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalePlan {
    pub assessment: Assessment,
    pub decisions: Vec<ScaleDecision>,
}

impl ScalePlan {
    /// The first decision, or `NoChange` for an empty plan.
    pub fn primary(&self) -> ScaleDecision {
        self.decisions.first().copied().unwrap_or(ScaleDecision::NoChange)
    }

    pub fn is_no_change(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// Evaluate a run's samples against the policy.
pub fn evaluate(
    topology: &ResourceTopology,
    series: &[MetricSeries],
    policy: &ThroughputPolicy,
    resolution: SignalResolution,
) -> ScalePlan {
    let mut assessment = Assessment::new(topology);
    for s in series {
        assessment.observe_series(s);
    }

    let mut decisions = Vec::with_capacity(2);

    if let Some(busy) = &assessment.busy {
        let (target, limit) = policy.clamp(busy.candidate);
        match limit {
            Some(Limit::Max) => info!(
                max = policy.max,
                candidate = busy.candidate,
                "max throughput limit reached; cannot scale up further"
            ),
            Some(Limit::Min) => info!(
                min = policy.min,
                candidate = busy.candidate,
                "scale-up candidate below min throughput; using min"
            ),
            None => {}
        }
        info!(resource = %topology.id, target, "scaling up throughput");
        decisions.push(ScaleDecision::Increase(target));
    }

    if assessment.is_over_provisioned() {
        if assessment.is_busy() && resolution == SignalResolution::BusyWins {
            debug!(resource = %topology.id, "busy signal suppresses scale-down");
        } else {
            let candidate = assessment.per_partition.saturating_sub(policy.step);
            let (target, limit) = policy.clamp(candidate);
            match limit {
                Some(Limit::Min) => info!(
                    min = policy.min,
                    candidate,
                    "min throughput limit reached; cannot scale down further"
                ),
                Some(Limit::Max) => info!(
                    max = policy.max,
                    candidate,
                    "scale-down candidate above max throughput; using max"
                ),
                None => {}
            }
            info!(
                resource = %topology.id,
                target,
                headroom = ?assessment.headroom,
                "scaling down throughput"
            );
            decisions.push(ScaleDecision::Decrease(target));
        }
    }

    if decisions.is_empty() {
        debug!(resource = %topology.id, "no scaling signal");
    }

    ScalePlan {
        assessment,
        decisions,
    }
}
