//! Request signing for the Bitvavo REST API.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct BitvavoAuth {
    api_key: String,
    api_secret: String,
}

impl BitvavoAuth {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Current timestamp in milliseconds.
    pub fn timestamp() -> String {
        chrono::Utc::now().timestamp_millis().to_string()
    }

    /// Hex HMAC-SHA256 over `timestamp + method + path + body`.
    ///
    /// `path` includes the API version prefix and query string.
    pub fn signature(&self, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| anyhow!("Invalid API secret: {}", e))?;
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
        access_window: u64,
    ) -> Result<HeaderMap> {
        let timestamp = Self::timestamp();
        let signature = self.signature(&timestamp, method, path, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("bitvavo-access-key"),
            HeaderValue::from_str(&self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("bitvavo-access-signature"),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(
            HeaderName::from_static("bitvavo-access-timestamp"),
            HeaderValue::from_str(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("bitvavo-access-window"),
            HeaderValue::from_str(&access_window.to_string())?,
        );
        Ok(headers)
    }
}
