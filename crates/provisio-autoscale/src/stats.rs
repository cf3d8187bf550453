//! Run statistics: counters describing what the control loop has done.
//!
//! Lock-free atomics so the status endpoint can read them while a run
//! is in flight.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use provisio_core::{AutoscaleError, ScaleDecision};

#[derive(Debug, Default)]
pub struct RunStats {
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    runs_skipped: AtomicU64,
    scale_ups: AtomicU64,
    scale_downs: AtomicU64,
    partition_count: AtomicU64,
    provisioned_throughput: AtomicU64,
    last_applied_throughput: AtomicU64,
    last_run_epoch: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub runs_skipped: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub partition_count: u64,
    pub provisioned_throughput: u64,
    pub last_applied_throughput: u64,
    pub last_run_epoch: u64,
    pub last_error: Option<String>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        self.last_run_epoch.store(epoch_secs(), Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.runs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Topology observed at the start of a run.
    pub fn record_topology(&self, partition_count: u32, provisioned: u64) {
        self.partition_count
            .store(u64::from(partition_count), Ordering::Relaxed);
        self.provisioned_throughput
            .store(provisioned, Ordering::Relaxed);
    }

    /// A decision the store accepted.
    pub fn record_applied(&self, decision: ScaleDecision, applied: u64) {
        match decision {
            ScaleDecision::Increase(_) => {
                self.scale_ups.fetch_add(1, Ordering::Relaxed);
            }
            ScaleDecision::Decrease(_) => {
                self.scale_downs.fetch_add(1, Ordering::Relaxed);
            }
            ScaleDecision::NoChange => return,
        }
        self.last_applied_throughput
            .store(applied, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        *self.last_error_slot() = None;
    }

    pub fn record_failure(&self, error: &AutoscaleError) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error_slot() = Some(error.kind().to_string());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_skipped: self.runs_skipped.load(Ordering::Relaxed),
            scale_ups: self.scale_ups.load(Ordering::Relaxed),
            scale_downs: self.scale_downs.load(Ordering::Relaxed),
            partition_count: self.partition_count.load(Ordering::Relaxed),
            provisioned_throughput: self.provisioned_throughput.load(Ordering::Relaxed),
            last_applied_throughput: self.last_applied_throughput.load(Ordering::Relaxed),
            last_run_epoch: self.last_run_epoch.load(Ordering::Relaxed),
            last_error: self.last_error_slot().clone(),
        }
    }

    fn last_error_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
