//! Document store REST client: collection topology and offer throughput.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use provisio_autoscale::{CapacityController, TopologyReader};
use provisio_core::{AutoscaleError, AutoscaleResult, ResourceId, ResourceTopology};

use crate::auth::{MasterKey, http_date};
use crate::error::{AzureError, check_status};
use crate::wire::{Collection, Offer, OfferFeed, PartitionKeyRangeFeed};

const API_VERSION: &str = "2018-12-31";
const CONTINUATION: &str = "x-ms-continuation";

#[derive(Clone)]
pub struct DocumentDbClient {
    http: Client,
    account_uri: String,
    key: MasterKey,
}

impl DocumentDbClient {
    pub fn new(account_uri: &str, auth_key: &str) -> Result<Self, AzureError> {
        let account_uri = account_uri.trim_end_matches('/').to_string();
        if !account_uri.starts_with("http://") && !account_uri.starts_with("https://") {
            return Err(AzureError::InvalidUrl(account_uri));
        }
        Ok(Self {
            http: crate::http_client()?,
            account_uri,
            key: MasterKey::from_base64(auth_key)?,
        })
    }

    /// Send one signed request.
    async fn send(
        &self,
        method: Method,
        path: &str,
        resource_type: &str,
        resource_link: &str,
        continuation: Option<&str>,
        body: Option<&Offer>,
    ) -> Result<reqwest::Response, AzureError> {
        let date = http_date(Utc::now());
        let authorization =
            self.key
                .authorization(method.as_str(), resource_type, resource_link, &date)?;
        let url = format!("{}/{}", self.account_uri, path);
        let method_name = method.to_string();

        let mut req = self
            .http
            .request(method, &url)
            .header("authorization", authorization)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header("accept", "application/json");
        if let Some(token) = continuation {
            req = req.header(CONTINUATION, token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        check_status(method_name, req.send().await?).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resource_type: &str,
        resource_link: &str,
    ) -> Result<T, AzureError> {
        let resp = self
            .send(Method::GET, path, resource_type, resource_link, None, None)
            .await?;
        Ok(resp.json().await?)
    }

    /// Read every page of a feed, following continuation tokens.
    async fn get_feed<T: DeserializeOwned>(
        &self,
        path: &str,
        resource_type: &str,
        resource_link: &str,
    ) -> Result<Vec<T>, AzureError> {
        let mut pages = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .send(
                    Method::GET,
                    path,
                    resource_type,
                    resource_link,
                    continuation.as_deref(),
                    None,
                )
                .await?;
            continuation = resp
                .headers()
                .get(CONTINUATION)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            pages.push(resp.json::<T>().await?);
            if continuation.is_none() {
                return Ok(pages);
            }
        }
    }

    #[instrument(skip(self), fields(resource = %resource), level = "debug")]
    pub async fn read_collection(&self, resource: &ResourceId) -> Result<Collection, AzureError> {
        let link = collection_link(resource);
        self.get_json(&link, "colls", &link).await
    }

    #[instrument(skip(self), fields(resource = %resource), level = "debug")]
    pub async fn partition_count(&self, resource: &ResourceId) -> Result<u32, AzureError> {
        let link = collection_link(resource);
        let pages: Vec<PartitionKeyRangeFeed> = self
            .get_feed(&format!("{link}/pkranges"), "pkranges", &link)
            .await?;
        let count: usize = pages.iter().map(|p| p.ranges.len()).sum();
        u32::try_from(count).map_err(|_| AzureError::InvalidResponse(format!("{count} partitions")))
    }

    /// The offer attached to a collection.
    #[instrument(skip(self, collection), fields(collection = %collection.id), level = "debug")]
    pub async fn find_offer(&self, collection: &Collection) -> Result<Offer, AzureError> {
        let pages: Vec<OfferFeed> = self.get_feed("offers", "offers", "").await?;
        pages
            .into_iter()
            .flat_map(|p| p.offers)
            .find(|o| o.offer_resource_id == collection.rid)
            .ok_or_else(|| AzureError::NotFound(format!("offer for collection {}", collection.id)))
    }

    pub async fn read_offer(&self, offer_rid: &str) -> Result<Offer, AzureError> {
        let link = offer_rid.to_lowercase();
        self.get_json(&format!("offers/{offer_rid}"), "offers", &link)
            .await
    }

    pub async fn replace_offer(&self, offer: &Offer) -> Result<Offer, AzureError> {
        let link = offer.rid.to_lowercase();
        let resp = self
            .send(
                Method::PUT,
                &format!("offers/{}", offer.rid),
                "offers",
                &link,
                None,
                Some(offer),
            )
            .await?;
        Ok(resp.json().await?)
    }

    async fn topology(&self, resource: &ResourceId) -> Result<(Collection, u32, u64), AzureError> {
        let collection = self.read_collection(resource).await?;
        let partitions = self.partition_count(resource).await?;
        let offer = self.find_offer(&collection).await?;
        let throughput = offer
            .throughput()
            .ok_or_else(|| AzureError::InvalidResponse(format!("offer {} has no throughput", offer.id)))?;
        Ok((collection, partitions, throughput))
    }

    async fn apply(&self, resource: &ResourceId, target: u64) -> Result<u64, AzureError> {
        let collection = self.read_collection(resource).await?;
        let offer = self.find_offer(&collection).await?;
        let current = offer.throughput();

        if current == Some(target) {
            debug!(%resource, target, "throughput already applied; replace skipped");
            return Ok(target);
        }

        self.replace_offer(&offer.with_throughput(target)).await?;
        let applied = self
            .read_offer(&offer.rid)
            .await?
            .throughput()
            .ok_or_else(|| AzureError::InvalidResponse(format!("offer {} has no throughput", offer.id)))?;
        info!(%resource, from = ?current, to = applied, "offer throughput replaced");
        Ok(applied)
    }
}

#[async_trait]
impl TopologyReader for DocumentDbClient {
    async fn get_topology(&self, resource: &ResourceId) -> AutoscaleResult<ResourceTopology> {
        let (collection, partitions, throughput) = self
            .topology(resource)
            .await
            .map_err(|e| AutoscaleError::TopologyUnavailable(e.to_string()))?;
        Ok(ResourceTopology::new(resource.clone(), partitions, throughput)?
            .with_self_link(collection.self_link))
    }
}

#[async_trait]
impl CapacityController for DocumentDbClient {
    async fn apply_throughput(&self, resource: &ResourceId, target: u64) -> AutoscaleResult<u64> {
        self.apply(resource, target)
            .await
            .map_err(|e| AutoscaleError::CapacityApplyFailed {
                target,
                reason: e.to_string(),
            })
    }

    async fn current_throughput(&self, resource: &ResourceId) -> AutoscaleResult<u64> {
        let (_, _, throughput) = self
            .topology(resource)
            .await
            .map_err(|e| AutoscaleError::TopologyUnavailable(e.to_string()))?;
        Ok(throughput)
    }
}

fn collection_link(resource: &ResourceId) -> String {
    format!("dbs/{}/colls/{}", resource.database, resource.collection)
}
