//! provisio-azure: HTTP collaborators for the autoscaler.
//!
//! Talks to three services:
//!
//! ```text
//! DocumentDbClient       (account REST API, master-key signed)
//!   ├── TopologyReader      collection + partition key ranges + offer
//!   └── CapacityController  offer read / replace
//!
//! MonitorMetricsClient   (management API, bearer token)
//!   └── MetricsGateway      collection metrics for a window
//!
//! AadTokenProvider       (identity endpoint, client credentials)
//!   └── TokenProvider
//! ```
//!
//! Transport failures are reported as [`AzureError`] internally and
//! mapped onto the autoscaler's error taxonomy at each trait boundary.

pub mod auth;
pub mod documentdb;
pub mod error;
pub mod monitor;
pub mod token;
pub mod wire;

pub use documentdb::DocumentDbClient;
pub use error::AzureError;
pub use monitor::MonitorMetricsClient;
pub use token::AadTokenProvider;

use std::time::Duration;

/// Request timeout shared by every client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Public cloud management endpoint.
pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Public cloud identity endpoint.
pub const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

pub(crate) fn http_client() -> Result<reqwest::Client, AzureError> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .build()?)
}
