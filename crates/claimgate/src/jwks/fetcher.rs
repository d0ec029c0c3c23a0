//! Key set document fetching

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::validate_jwks_uri;
use crate::error::{FilterError, FilterResult};

/// Source of the key set document
///
/// The refresh path only needs the raw bytes; parsing happens in
/// [`super::parse_key_set`].
#[async_trait]
pub trait KeySetFetcher: Send + Sync + std::fmt::Debug {
    /// Fetch the current document
    ///
    /// # Errors
    ///
    /// Returns `FilterError::KeySetFetch` when the document cannot be read.
    async fn fetch(&self) -> FilterResult<Vec<u8>>;

    /// Where the document comes from, for logs
    fn source(&self) -> &str;
}

/// Fetches the key set document over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    jwks_uri: String,
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `jwks_uri`
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Configuration` when the URI is not HTTPS (plain
    /// HTTP is only accepted for the local host) or the client cannot be
    /// built.
    pub fn new(jwks_uri: impl Into<String>, timeout: Duration) -> FilterResult<Self> {
        let jwks_uri = jwks_uri.into();
        validate_jwks_uri(&jwks_uri)?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FilterError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            jwks_uri,
            http_client,
        })
    }

    /// The key set endpoint
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> FilterResult<Vec<u8>> {
        info!(jwks_uri = %self.jwks_uri, "Fetching key set from endpoint");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to fetch key set");
                FilterError::key_set_fetch(format!("Key set fetch failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(
                jwks_uri = %self.jwks_uri,
                status = %status,
                "Key set endpoint returned error status"
            );
            return Err(FilterError::key_set_fetch_with_status(
                format!("Key set endpoint returned status {status}"),
                status.as_u16(),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to read key set body");
            FilterError::key_set_fetch(format!("Key set body read failed: {e}"))
        })?;

        Ok(body.to_vec())
    }

    fn source(&self) -> &str {
        &self.jwks_uri
    }
}
