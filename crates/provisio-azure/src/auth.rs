//! Master-key request signing for the document store REST API.
//!
//! Each request carries an `x-ms-date` header and an `authorization`
//! header holding an HMAC-SHA256 signature over the verb, resource
//! type, resource link, and date.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;

use crate::error::AzureError;

type HmacSha256 = Hmac<Sha256>;

/// Characters escaped in the authorization token (URI component rules).
const TOKEN_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A decoded account master key.
#[derive(Clone)]
pub struct MasterKey {
    key: Vec<u8>,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

impl MasterKey {
    /// Decode a base64 account key.
    pub fn from_base64(encoded: &str) -> Result<Self, AzureError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AzureError::InvalidKey(e.to_string()))?;
        if key.is_empty() {
            return Err(AzureError::InvalidKey("empty key".to_string()));
        }
        Ok(Self { key })
    }

    /// The URL-encoded `authorization` header value for one request.
    pub fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String, AzureError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AzureError::InvalidKey(e.to_string()))?;
        mac.update(string_to_sign(verb, resource_type, resource_link, date).as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let token = format!("type=master&ver=1.0&sig={signature}");
        Ok(utf8_percent_encode(&token, TOKEN_ESCAPE).to_string())
    }
}

/// The signed payload. Verb, resource type, and date are lowercased;
/// the resource link is used as given.
pub fn string_to_sign(verb: &str, resource_type: &str, resource_link: &str, date: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    )
}

/// RFC 1123 date for the `x-ms-date` header.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
