//! Monitoring API client: collection metrics over a time window.

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::Client;
use tracing::{debug, instrument};

use provisio_autoscale::MetricsGateway;
use provisio_core::{
    AccessToken, AutoscaleError, AutoscaleResult, MetricSeries, MetricWindow, ResourceTopology,
};

use crate::error::{AzureError, check_status};
use crate::wire::MetricCollection;

const API_VERSION: &str = "2014-04-01";

/// Characters escaped inside the `$filter` expression.
const FILTER_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'+')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Clone)]
pub struct MonitorMetricsClient {
    http: Client,
    management_uri: String,
    subscription_id: String,
    resource_group: String,
    account: String,
}

impl MonitorMetricsClient {
    pub fn new(
        management_uri: &str,
        subscription_id: &str,
        resource_group: &str,
        account: &str,
    ) -> Result<Self, AzureError> {
        Ok(Self {
            http: crate::http_client()?,
            management_uri: management_uri.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            account: account.to_string(),
        })
    }

    /// Metrics URL for a collection, addressed by its self link.
    pub fn metrics_url(&self, self_link: &str, metric: &str, window: &MetricWindow) -> String {
        let filter = format!(
            "(name.value eq '{metric}') and endTime eq {end} and startTime eq {start} and timeGrain eq duration'{grain}'",
            end = window.end.format("%Y-%m-%dT%H:%M:00.000Z"),
            start = window.start.format("%Y-%m-%dT%H:%M:00.000Z"),
            grain = window.granularity_iso8601(),
        );
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DocumentDb/databaseAccounts/{}/{}/metrics?api-version={API_VERSION}&$filter={}",
            self.management_uri,
            self.subscription_id,
            self.resource_group,
            self.account,
            management_path(self_link),
            utf8_percent_encode(&filter, FILTER_ESCAPE),
        )
    }

    #[instrument(skip(self, token), fields(metric = %metric), level = "debug")]
    pub async fn fetch(
        &self,
        self_link: &str,
        metric: &str,
        window: &MetricWindow,
        token: &AccessToken,
    ) -> Result<Vec<MetricSeries>, AzureError> {
        let url = self.metrics_url(self_link, metric, window);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token.secret())
            .header("accept", "application/json")
            .send()
            .await?;
        let collection: MetricCollection = check_status("GET", resp).await?.json().await?;

        let series: Vec<MetricSeries> = collection
            .value
            .into_iter()
            .map(|m| m.into_series(metric))
            .collect();
        debug!(series = series.len(), "metrics fetched");
        Ok(series)
    }
}

#[async_trait]
impl MetricsGateway for MonitorMetricsClient {
    async fn get_series(
        &self,
        topology: &ResourceTopology,
        metric: &str,
        window: &MetricWindow,
        token: &AccessToken,
    ) -> AutoscaleResult<Vec<MetricSeries>> {
        let self_link = topology.self_link.as_deref().ok_or_else(|| {
            AutoscaleError::MetricsUnavailable(format!("{} has no resolved self link", topology.id))
        })?;
        self.fetch(self_link, metric, window, token)
            .await
            .map_err(|e| AutoscaleError::MetricsUnavailable(e.to_string()))
    }
}

/// Map a store self link (`dbs/{rid}/colls/{rid}/`) onto the management
/// API's segment names (`databases/{rid}/collections/{rid}`).
fn management_path(self_link: &str) -> String {
    self_link
        .trim_matches('/')
        .split('/')
        .enumerate()
        .map(|(i, segment)| match (i % 2, segment) {
            (0, "dbs") => "databases",
            (0, "colls") => "collections",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn window() -> MetricWindow {
        MetricWindow {
            start: Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 1, 11, 50, 0).unwrap(),
            granularity: Duration::from_secs(3600),
        }
    }

    #[test]
    fn management_path_renames_segment_kinds_only() {
        assert_eq!(
            management_path("dbs/XP0mAA==/colls/XP0mAJ3H-AA=/"),
            "databases/XP0mAA==/collections/XP0mAJ3H-AA="
        );
        // A rid that happens to read "dbs" is left alone.
        assert_eq!(management_path("dbs/dbs/colls/colls/"), "databases/dbs/collections/colls");
    }

    #[test]
    fn metrics_url_layout() {
        let client = MonitorMetricsClient::new("https://management.azure.com/", "sub", "rg", "acct").unwrap();
        let url = client.metrics_url("dbs/d==/colls/c=/", "Max RUs Per Second", &window());

        assert!(url.starts_with(
            "https://management.azure.com/subscriptions/sub/resourceGroups/rg/providers/Microsoft.DocumentDb/databaseAccounts/acct/databases/d==/collections/c=/metrics?api-version=2014-04-01&$filter="
        ));
        assert!(url.contains("(name.value%20eq%20%27Max%20RUs%20Per%20Second%27)"));
        assert!(url.contains("endTime%20eq%202024-05-01T11%3A50%3A00.000Z"));
        assert!(url.contains("startTime%20eq%202024-05-01T11%3A00%3A00.000Z"));
        assert!(url.contains("timeGrain%20eq%20duration%27PT1H%27"));
    }

    #[tokio::test]
    async fn missing_self_link_is_metrics_unavailable() {
        let client = MonitorMetricsClient::new("https://management.azure.com", "sub", "rg", "acct").unwrap();
        let topology = ResourceTopology::new(provisio_core::ResourceId::new("acct", "db", "c"), 1, 400).unwrap();

        let err = client
            .get_series(&topology, "Max RUs Per Second", &window(), &AccessToken::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, AutoscaleError::MetricsUnavailable(_)));
    }
}
