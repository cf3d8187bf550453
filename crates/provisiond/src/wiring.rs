//! Config loading and collaborator assembly.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use provisio_autoscale::{Collaborators, InMemoryStore};
use provisio_azure::{
    AadTokenProvider, DocumentDbClient, LOGIN_ENDPOINT, MANAGEMENT_ENDPOINT, MonitorMetricsClient,
};
use provisio_core::{AutoscaleConfig, MetricSample, MetricSeries, RawConfig};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "provisio.toml";

/// Load the file (if any) and overlay the environment.
///
/// An explicit path must exist. The default path is optional, so a
/// deployment configured purely through the environment still starts.
pub fn load_config<F>(path: Option<&Path>, lookup: F) -> anyhow::Result<RawConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = match path {
        Some(path) => RawConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            RawConfig::from_file(Path::new(DEFAULT_CONFIG))?
        }
        None => {
            info!("no {DEFAULT_CONFIG} found; using environment only");
            RawConfig::default()
        }
    };
    Ok(raw.overlay_env(lookup))
}

/// Collaborators backed by the document store and monitoring APIs.
pub fn azure_collaborators(raw: &RawConfig, config: &AutoscaleConfig) -> anyhow::Result<Collaborators> {
    let settings = raw.azure_settings()?;
    info!(settings = ?settings, "cloud collaborators configured");

    let documents = Arc::new(
        DocumentDbClient::new(&settings.account_uri, &settings.auth_key)
            .context("document store client")?,
    );
    let tokens = AadTokenProvider::new(
        LOGIN_ENDPOINT,
        &settings.tenant_id,
        &settings.application_id,
        &settings.application_secret,
    )
    .context("token provider")?;
    let metrics = MonitorMetricsClient::new(
        MANAGEMENT_ENDPOINT,
        &settings.subscription_id,
        &settings.resource_group,
        &config.resource.account,
    )
    .context("monitoring client")?;

    Ok(Collaborators {
        topology: documents.clone(),
        tokens: Arc::new(tokens),
        metrics: Arc::new(metrics),
        capacity: documents,
    })
}

/// An in-memory collection whose metric window holds `peaks`, one sample
/// per minute ending at `now`.
pub fn simulated_store(
    partitions: u32,
    throughput: u64,
    peaks: &[f64],
    now: DateTime<Utc>,
) -> anyhow::Result<Arc<InMemoryStore>> {
    if partitions == 0 {
        bail!("--partitions must be at least 1");
    }
    if peaks.iter().any(|p| !p.is_finite() || *p < 0.0) {
        bail!("--peak values must be finite and non-negative");
    }
    if peaks.is_empty() {
        warn!("no --peak values; the window will be empty");
    }

    let count = peaks.len() as i64;
    let samples = peaks
        .iter()
        .enumerate()
        .map(|(i, peak)| MetricSample::peak(now - Duration::minutes(count - i as i64), *peak))
        .collect();

    let store = InMemoryStore::new(partitions, throughput);
    store.set_series(vec![MetricSeries::new("simulated", samples)]);
    Ok(Arc::new(store))
}

/// Wait for the scheduler task to finish. A panicked loop is an error.
pub async fn join_scheduler(handle: JoinHandle<()>) -> anyhow::Result<()> {
    match handle.await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "scheduler loop terminated abnormally");
            Err(e).context("scheduler loop terminated abnormally")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/provisio.toml")), env(&[])).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/provisio.toml"));
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[resource]\naccount = \"acct\"\ndatabase = \"db\"\ncollection = \"orders\"\n\n[policy]\nmin_throughput = 400\nmax_throughput = 4000\nthroughput_step = 100\n"
        )
        .unwrap();

        let raw = load_config(Some(file.path()), env(&[("maxAllowedThroughput", "8000")])).unwrap();
        let config = raw.resolve().unwrap();
        assert_eq!(config.policy.max, 8000);
        assert_eq!(config.policy.min, 400);
        assert_eq!(config.resource.collection, "orders");
    }

    #[test]
    fn azure_collaborators_need_credentials() {
        let raw = RawConfig::scaffold("acct", "db", "orders");
        let config = raw.resolve().unwrap();
        assert!(azure_collaborators(&raw, &config).is_err());
    }

    #[test]
    fn simulated_samples_end_at_now() {
        let now = Utc::now();
        let store = simulated_store(2, 800, &[100.0, 900.0], now).unwrap();
        assert_eq!(store.throughput(), 800);
        assert!(simulated_store(0, 800, &[], now).is_err());
        assert!(simulated_store(1, 800, &[f64::NAN], now).is_err());
    }

    #[tokio::test]
    async fn finished_scheduler_joins_cleanly() {
        let handle = tokio::spawn(async {});
        join_scheduler(handle).await.unwrap();
    }

    #[tokio::test]
    async fn panicked_scheduler_is_an_error() {
        let handle: JoinHandle<()> = tokio::spawn(async { panic!("loop died") });
        let err = join_scheduler(handle).await.unwrap_err();
        assert!(err.to_string().contains("scheduler loop terminated abnormally"));
    }
}
