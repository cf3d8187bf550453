use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid account key: {0}")]
    InvalidKey(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for AzureError {
    fn from(e: serde_json::Error) -> Self {
        AzureError::InvalidResponse(e.to_string())
    }
}

/// Turn a non-2xx response into [`AzureError::Status`], keeping the body
/// for diagnostics.
pub(crate) async fn check_status(
    method: impl Into<String>,
    resp: reqwest::Response,
) -> Result<reqwest::Response, AzureError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(AzureError::Status {
        method: method.into(),
        url,
        status: status.as_u16(),
        body,
    })
}
