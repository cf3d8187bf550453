//! Response and request bodies exchanged with the REST APIs.
//!
//! Only the fields the autoscaler reads are typed. Offers keep every
//! other field in `extra` so a replace sends back what was read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use provisio_core::{MetricSample, MetricSeries};

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    pub id: String,
    #[serde(rename = "_rid")]
    pub rid: String,
    #[serde(rename = "_self")]
    pub self_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionKeyRangeFeed {
    #[serde(rename = "PartitionKeyRanges", default)]
    pub ranges: Vec<PartitionKeyRange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionKeyRange {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferFeed {
    #[serde(rename = "Offers", default)]
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    #[serde(rename = "_rid")]
    pub rid: String,
    #[serde(rename = "offerResourceId")]
    pub offer_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<OfferContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferContent {
    #[serde(rename = "offerThroughput")]
    pub offer_throughput: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Offer {
    pub fn throughput(&self) -> Option<u64> {
        self.content.as_ref().map(|c| c.offer_throughput)
    }

    /// A copy with the throughput replaced.
    pub fn with_throughput(&self, throughput: u64) -> Offer {
        let mut offer = self.clone();
        match offer.content.as_mut() {
            Some(content) => content.offer_throughput = throughput,
            None => {
                offer.content = Some(OfferContent {
                    offer_throughput: throughput,
                    extra: Map::new(),
                })
            }
        }
        offer
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricCollection {
    #[serde(default)]
    pub value: Vec<Metric>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub name: Option<LocalizableString>,
    #[serde(default)]
    pub dimension_name: Option<String>,
    #[serde(default)]
    pub dimension_value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub metric_values: Vec<MetricSample>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizableString {
    pub value: Option<String>,
    pub localized_value: Option<String>,
}

impl Metric {
    /// Convert to a series. The dimension label prefers the dimension
    /// value, then the metric name, then `fallback`.
    pub fn into_series(self, fallback: &str) -> MetricSeries {
        let dimension = self
            .dimension_value
            .or_else(|| self.name.and_then(|n| n.value))
            .unwrap_or_else(|| fallback.to_string());
        MetricSeries {
            dimension,
            unit: self.unit,
            samples: self.metric_values,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}
