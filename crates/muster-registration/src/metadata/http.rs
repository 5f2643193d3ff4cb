//! HTTP metadata fetcher.
//!
//! This is the ONLY place for status code handling; the resolver only sees
//! [`FetchError`] variants.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{FetchError, RegistrationError, RegistrationResult};

use super::fetch::MetadataFetcher;

const USER_AGENT_VALUE: &str = concat!("muster-registration/", env!("CARGO_PKG_VERSION"));

/// [`MetadataFetcher`] over a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new(timeout: Duration) -> RegistrationResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistrationError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(url, "fetching metadata");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Connection {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        match response.status() {
            // Raw body, no charset decoding.
            status if status.is_success() => response
                .bytes()
                .await
                .map(|body| body.to_vec())
                .map_err(|e| FetchError::Connection {
                    url: url.to_string(),
                    message: format!("failed to read response body: {}", e),
                }),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            status => Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_client() -> RegistrationResult<()> {
        let fetcher = HttpMetadataFetcher::new(Duration::from_secs(1))?;
        assert!(format!("{:?}", fetcher).starts_with("HttpMetadataFetcher"));
        Ok(())
    }
}
