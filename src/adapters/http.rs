//! HTTP asset origin.

use std::time::Duration;

use async_trait::async_trait;

use super::{AssetSource, ProviderError, ProviderResult};

/// Fetches assets with a plain GET
pub struct HttpAssetSource {
    client: reqwest::Client,
}

impl Default for HttpAssetSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl HttpAssetSource {
    pub fn new(request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

fn classify(url: &str, error: reqwest::Error) -> ProviderError {
    let message = format!("GET {}: {}", url, error);
    if error.is_timeout() {
        ProviderError::Timeout(message)
    } else if error.is_connect() || error.is_request() || error.is_body() {
        ProviderError::Transient(message)
    } else {
        ProviderError::Other(message)
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch(&self, url: &str) -> ProviderResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("GET {} returned {}", url, status);
            return Err(match status.as_u16() {
                404 | 410 => ProviderError::NotFound(message),
                401 | 403 => ProviderError::PermissionDenied(message),
                429 => ProviderError::Transient(message),
                code if code >= 500 => ProviderError::Transient(message),
                _ => ProviderError::Other(message),
            });
        }

        let bytes = response.bytes().await.map_err(|e| classify(url, e))?;
        Ok(bytes.to_vec())
    }
}
