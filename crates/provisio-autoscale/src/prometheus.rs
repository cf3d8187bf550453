//! Prometheus text exposition format.
//!
//! Renders run statistics for scraping by a Prometheus server or
//! compatible agent.

use provisio_core::ResourceId;

use crate::stats::StatsSnapshot;

/// Render run statistics into Prometheus text format.
///
/// Every sample carries a `resource` label.
pub fn render_prometheus(resource: &ResourceId, stats: &StatsSnapshot) -> String {
    let label = format!("resource=\"{resource}\"");
    let mut out = String::new();

    let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
        out.push_str(&format!("# HELP provisio_{name} {help}\n"));
        out.push_str(&format!("# TYPE provisio_{name} {kind}\n"));
        out.push_str(&format!("provisio_{name}{{{label}}} {value}\n"));
    };

    metric("runs_started_total", "counter", "Autoscale runs started.", stats.runs_started);
    metric("runs_succeeded_total", "counter", "Autoscale runs completed.", stats.runs_succeeded);
    metric("runs_failed_total", "counter", "Autoscale runs aborted by an error.", stats.runs_failed);
    metric(
        "runs_skipped_total",
        "counter",
        "Triggers skipped because a run was in flight.",
        stats.runs_skipped,
    );
    metric("scale_ups_total", "counter", "Throughput increases applied.", stats.scale_ups);
    metric("scale_downs_total", "counter", "Throughput decreases applied.", stats.scale_downs);
    metric(
        "partitions",
        "gauge",
        "Partition count observed by the last run.",
        stats.partition_count,
    );
    metric(
        "provisioned_throughput",
        "gauge",
        "Provisioned throughput observed by the last run.",
        stats.provisioned_throughput,
    );
    metric(
        "applied_throughput",
        "gauge",
        "Last throughput value the store accepted.",
        stats.last_applied_throughput,
    );
    metric(
        "last_run_timestamp_seconds",
        "gauge",
        "Unix time the last run started.",
        stats.last_run_epoch,
    );

    out
}
