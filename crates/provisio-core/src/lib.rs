//! provisio-core: shared building blocks for the throughput autoscaler.
//!
//! Holds the data model consumed by the decision engine, the error
//! taxonomy every collaborator reports into, the configuration surface
//! (TOML file overlaid by environment variables), and trailing metric
//! window selection.

pub mod config;
pub mod error;
pub mod types;
pub mod window;

pub use config::{AutoscaleConfig, RawConfig};
pub use error::{AutoscaleError, AutoscaleResult};
pub use types::*;
pub use window::{MetricWindow, WindowConfig};
