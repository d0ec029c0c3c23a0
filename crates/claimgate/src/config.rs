//! Static filter configuration
//!
//! Loaded once at startup. Nothing here is re-read while the filter runs; the
//! key set is the only state that changes after [`crate::ClaimFilter::on_start`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{FilterError, FilterResult};
use crate::headers::SanitizedHeaderMap;
use crate::validator::AlgorithmFamily;

/// Default key set refresh period
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Default HTTP timeout for key set fetches
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment prefix used by [`FilterConfig::from_file`]
pub const ENV_PREFIX: &str = "CLAIMGATE";

/// One output header and the claim it is derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMapping {
    /// Request header name written downstream (and stripped upstream)
    pub header: String,
    /// Claim name read from the verified token payload
    pub claim: String,
}

impl HeaderMapping {
    /// Create a mapping
    pub fn new(header: impl Into<String>, claim: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            claim: claim.into(),
        }
    }
}

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Key set document location
    pub jwks_uri: Option<String>,

    /// Key set refresh period in seconds
    pub refresh_interval_secs: u64,

    /// Key set fetch timeout in seconds
    pub fetch_timeout_secs: u64,

    /// The single permitted signing algorithm family
    pub algorithm_family: AlgorithmFamily,

    /// Output header → claim mapping (also the strip set)
    pub headers: Vec<HeaderMapping>,

    /// Clock skew tolerance for exp / nbf, in seconds
    pub leeway_secs: u64,

    /// Expected `iss`, checked only when set
    pub issuer: Option<String>,

    /// Expected `aud`, checked only when set
    pub audience: Option<String>,

    /// Status sent when sanitization fails
    pub error_status: u16,

    /// Plaintext body sent when sanitization fails
    pub error_body: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            jwks_uri: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            algorithm_family: AlgorithmFamily::Hmac,
            headers: vec![
                HeaderMapping::new("org", "org"),
                HeaderMapping::new("user_uuid", "user_uuid"),
                HeaderMapping::new("principal_type", "principal_type"),
            ],
            leeway_secs: 0,
            issuer: None,
            audience: None,
            error_status: 500,
            error_body: "error sanitizing headers".to_string(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FilterConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// Environment variables with the `CLAIMGATE_` prefix override file
    /// settings, e.g. `CLAIMGATE_REFRESH_INTERVAL_SECS=30`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unknown extension, or
    /// does not deserialize into a `FilterConfig`.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`FilterConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Set the key set document location
    #[must_use]
    pub fn with_jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(uri.into());
        self
    }

    /// Set the refresh period
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_secs = interval.as_secs();
        self
    }

    /// Set the permitted algorithm family
    #[must_use]
    pub fn with_algorithm_family(mut self, family: AlgorithmFamily) -> Self {
        self.algorithm_family = family;
        self
    }

    /// Replace the header mapping
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<HeaderMapping>) -> Self {
        self.headers = headers;
        self
    }

    /// Set the clock skew tolerance
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway_secs = leeway.as_secs();
        self
    }

    /// Require a specific issuer
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Require a specific audience
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Refresh period as a `Duration`
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Fetch timeout as a `Duration`
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Build the strip / inject header table
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Configuration` for empty, invalid, or duplicate
    /// header names.
    pub fn sanitized_header_map(&self) -> FilterResult<SanitizedHeaderMap> {
        SanitizedHeaderMap::new(
            self.headers
                .iter()
                .map(|m| (m.header.as_str(), m.claim.as_str())),
        )
    }

    /// Check the configuration before the filter starts
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Configuration` naming the offending key.
    pub fn validate(&self) -> FilterResult<()> {
        self.sanitized_header_map()?;

        if self.refresh_interval_secs == 0 {
            return Err(FilterError::configuration_with_key(
                "refresh interval must be greater than zero",
                "refresh_interval_secs",
            ));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(FilterError::configuration_with_key(
                "fetch timeout must be greater than zero",
                "fetch_timeout_secs",
            ));
        }

        if !(500..=599).contains(&self.error_status) {
            return Err(FilterError::configuration_with_key(
                format!("error status {} is not a 5xx status", self.error_status),
                "error_status",
            ));
        }

        if let Some(uri) = &self.jwks_uri {
            validate_jwks_uri(uri)?;
        }

        Ok(())
    }
}

/// HTTPS only, except plain HTTP to the local host
pub(crate) fn validate_jwks_uri(uri: &str) -> FilterResult<()> {
    let url = Url::parse(uri).map_err(|e| {
        FilterError::configuration_with_key(format!("invalid key set URI: {e}"), "jwks_uri")
    })?;

    match url.scheme() {
        "https" => Ok(()),
        "http" if is_local_host(&url) => Ok(()),
        _ => Err(FilterError::configuration_with_key(
            "key set endpoint must use HTTPS (HTTP only allowed for localhost)",
            "jwks_uri",
        )),
    }
}

fn is_local_host(url: &Url) -> bool {
    matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}
