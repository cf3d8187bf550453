//! provisio-autoscale: throughput autoscaling for one partitioned collection.
//!
//! Each run reads the collection's partition layout and provisioned
//! throughput, fetches a trailing window of peak-utilization samples,
//! decides whether to raise or lower throughput, and applies absolute
//! targets clamped to the configured policy.
//!
//! # Decision Algorithm
//!
//! ```text
//! per_partition = provisioned / partitions          (integer division)
//! busy          = false
//! headroom      = assumed                          (over-provisioned until shown otherwise)
//!
//! for series in metrics:
//!     for sample in series:
//!         if sample.max > per_partition:
//!             busy, candidate = true, trunc(sample.max) * partitions
//!             break                                  (next series)
//!         elif sample.max < per_partition:
//!             headroom = observed
//!
//! if busy:      Increase(clamp(candidate))
//! if headroom:  Decrease(clamp(per_partition - step))  (skipped under busy-wins)
//! ```
//!
//! Runs never overlap: a trigger that arrives while a run is in flight
//! is skipped and counted.

pub mod collaborators;
pub mod engine;
pub mod memory;
pub mod prometheus;
pub mod scaler;
pub mod stats;

pub use collaborators::{
    CapacityController, Collaborators, MetricsGateway, TokenProvider, TopologyReader,
};
pub use engine::{Assessment, BusySignal, Headroom, ScalePlan, evaluate};
pub use memory::InMemoryStore;
pub use prometheus::render_prometheus;
pub use scaler::{AppliedChange, Autoscaler, RunOutcome, RunReport};
pub use stats::{RunStats, StatsSnapshot};
