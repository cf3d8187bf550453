//! provisiond: the autoscaling daemon.
//!
//! Wires the configured collaborators into an [`Autoscaler`], runs it on
//! its schedule, and serves run status over HTTP.
//!
//! # Status routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness plus the latest run counters |
//! | GET | `/metrics` | Prometheus exposition |
//! | POST | `/trigger` | Run now (skipped while a run is in flight) |
//!
//! [`Autoscaler`]: provisio_autoscale::Autoscaler

pub mod logging;
pub mod status;
pub mod wiring;

pub use status::{StatusState, build_router};
