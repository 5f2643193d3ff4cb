//! The metadata fetch seam.

use async_trait::async_trait;

use crate::error::FetchError;

/// Fetches one metadata document by absolute URL.
///
/// Implementations report a 404 as [`FetchError::NotFound`] so callers can
/// tell "no such document" apart from the service being unreachable.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Document body exactly as served.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Document body as UTF-8 text; invalid UTF-8 is an error, never replaced.
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let body = self.fetch_bytes(url).await?;
        String::from_utf8(body).map_err(|e| FetchError::InvalidText {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
