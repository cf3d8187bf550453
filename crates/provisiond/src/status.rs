//! Status endpoint handlers.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::{Value, json};

use provisio_autoscale::{Autoscaler, RunOutcome, RunReport, render_prometheus};

/// Shared state for status handlers.
#[derive(Clone)]
pub struct StatusState {
    pub autoscaler: Arc<Autoscaler>,
}

pub fn build_router(autoscaler: Arc<Autoscaler>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(prometheus_metrics))
        .route("/trigger", post(trigger))
        .with_state(StatusState { autoscaler })
}

/// GET /healthz
pub async fn healthz(State(state): State<StatusState>) -> impl IntoResponse {
    let config = state.autoscaler.config();
    Json(json!({
        "status": "ok",
        "resource": config.resource.to_string(),
        "interval_secs": config.interval.as_secs(),
        "stats": state.autoscaler.stats().snapshot(),
    }))
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<StatusState>) -> impl IntoResponse {
    let body = render_prometheus(
        &state.autoscaler.config().resource,
        &state.autoscaler.stats().snapshot(),
    );
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// POST /trigger
pub async fn trigger(State(state): State<StatusState>) -> impl IntoResponse {
    match state.autoscaler.run_once().await {
        Ok(RunOutcome::Completed(report)) => (StatusCode::OK, Json(report_json(&report))),
        Ok(RunOutcome::Skipped) => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "skipped", "reason": "run in flight" })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "failed", "kind": e.kind(), "error": e.to_string() })),
        ),
    }
}

/// JSON summary of a completed run.
pub fn report_json(report: &RunReport) -> Value {
    let assessment = &report.plan.assessment;
    json!({
        "status": "completed",
        "resource": report.topology.id.to_string(),
        "partitions": report.topology.partition_count,
        "provisioned": report.topology.current_throughput,
        "per_partition": assessment.per_partition,
        "window": {
            "start": report.window.start.to_rfc3339(),
            "end": report.window.end.to_rfc3339(),
            "granularity": report.window.granularity_iso8601(),
        },
        "busy": assessment.busy.as_ref().map(|b| json!({
            "dimension": b.dimension,
            "observed_at": b.observed_at.to_rfc3339(),
            "peak": b.peak,
            "candidate": b.candidate,
        })),
        "over_provisioned": assessment.is_over_provisioned(),
        "decisions": report.plan.decisions,
        "applied": report.applied.iter().map(|c| json!({
            "decision": c.decision.label(),
            "target": c.decision.target(),
            "applied": c.applied,
        })).collect::<Vec<_>>(),
    })
}
