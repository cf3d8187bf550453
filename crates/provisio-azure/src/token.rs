//! Client-credentials token for the management API.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use provisio_autoscale::TokenProvider;
use provisio_core::{AccessToken, AutoscaleError, AutoscaleResult};

use crate::error::{AzureError, check_status};
use crate::wire::TokenResponse;

/// Audience the management API expects.
pub const MANAGEMENT_RESOURCE: &str = "https://management.core.windows.net/";

/// Requests a fresh token on every call. Tokens are not cached.
#[derive(Clone)]
pub struct AadTokenProvider {
    http: Client,
    login_uri: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for AadTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AadTokenProvider")
            .field("login_uri", &self.login_uri)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl AadTokenProvider {
    pub fn new(
        login_uri: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, AzureError> {
        Ok(Self {
            http: crate::http_client()?,
            login_uri: login_uri.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/token", self.login_uri, self.tenant_id)
    }

    #[instrument(skip(self), fields(tenant = %self.tenant_id), level = "debug")]
    pub async fn acquire(&self) -> Result<AccessToken, AzureError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("resource", MANAGEMENT_RESOURCE),
        ];
        let resp = self.http.post(self.token_url()).form(&form).send().await?;
        let token: TokenResponse = check_status("POST", resp).await?.json().await?;

        if token.access_token.is_empty() {
            return Err(AzureError::InvalidResponse("empty access token".to_string()));
        }
        debug!(token_type = ?token.token_type, "access token acquired");
        Ok(AccessToken::new(token.access_token))
    }
}

#[async_trait]
impl TokenProvider for AadTokenProvider {
    async fn get_access_token(&self) -> AutoscaleResult<AccessToken> {
        self.acquire()
            .await
            .map_err(|e| AutoscaleError::AuthFailed(e.to_string()))
    }
}
