//! Status server regression tests.
//!
//! Drives the router against an in-memory collection: health, Prometheus
//! exposition before and after a run, manual triggers, and the skip
//! when a run is already in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use provisio_autoscale::*;
use provisio_core::*;
use provisiond::build_router;

fn config() -> AutoscaleConfig {
    AutoscaleConfig::new(
        ResourceId::new("acct", "db", "orders"),
        ThroughputPolicy::new(400, 10_000, 100).unwrap(),
    )
}

fn autoscaler(store: Arc<InMemoryStore>) -> Arc<Autoscaler> {
    Arc::new(Autoscaler::new(config(), Collaborators::single(store)))
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn healthz_reports_resource() {
    let router = build_router(autoscaler(Arc::new(InMemoryStore::new(1, 1000))));

    let resp = router.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["resource"], "acct/db/orders");
    assert_eq!(body["stats"]["runs_started"], 0);
}

#[tokio::test]
async fn trigger_runs_and_metrics_reflect_it() {
    let store = Arc::new(InMemoryStore::new(2, 2000));
    let router = build_router(autoscaler(store.clone()));

    let resp = router.clone().oneshot(post("/trigger")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["applied"][0]["applied"], 900);
    assert_eq!(store.throughput(), 900);

    let resp = router.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = body_text(resp).await;
    assert!(text.contains("provisio_runs_succeeded_total{resource=\"acct/db/orders\"} 1"));
    assert!(text.contains("provisio_scale_downs_total{resource=\"acct/db/orders\"} 1"));
    assert!(text.contains("provisio_applied_throughput{resource=\"acct/db/orders\"} 900"));
}

#[tokio::test]
async fn failed_trigger_reports_error_kind() {
    let store = Arc::new(InMemoryStore::new(1, 1000));
    store.fail_metrics(true);
    let router = build_router(autoscaler(store));

    let resp = router.oneshot(post("/trigger")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(body["kind"], "metrics_unavailable");
}

/// Topology reads block until released, holding the run open.
struct Gate {
    store: Arc<InMemoryStore>,
    release: tokio::sync::Notify,
}

#[async_trait]
impl TopologyReader for Gate {
    async fn get_topology(&self, resource: &ResourceId) -> AutoscaleResult<ResourceTopology> {
        self.release.notified().await;
        self.store.get_topology(resource).await
    }
}

#[tokio::test]
async fn trigger_during_run_is_skipped() {
    let store = Arc::new(InMemoryStore::new(1, 1000));
    let gate = Arc::new(Gate {
        store: store.clone(),
        release: tokio::sync::Notify::new(),
    });
    let mut collaborators = Collaborators::single(store.clone());
    collaborators.topology = gate.clone();
    let router = build_router(Arc::new(Autoscaler::new(config(), collaborators)));

    let first = tokio::spawn(router.clone().oneshot(post("/trigger")));
    // Let the first run take the guard.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resp = router.oneshot(post("/trigger")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    gate.release.notify_one();
    let resp = first.await.unwrap().unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(store.applies().len(), 1);
}
