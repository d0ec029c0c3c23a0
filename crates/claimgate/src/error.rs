//! Error types for claimgate
//!
//! Every failure the filter can observe has its own variant so that logs can
//! tell them apart. Behaviour only branches on one distinction:
//! - [`FilterError::HeaderIo`] is fatal and fails the request closed
//! - everything else is caught by the orchestrator and the request continues
//!   unauthenticated

use thiserror::Error;

/// Result type for filter operations
pub type FilterResult<T> = std::result::Result<T, FilterError>;

/// Main error type for claimgate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FilterError {
    /// The host failed to remove or add a request header
    #[error("Header I/O error on '{header}': {message}")]
    HeaderIo { header: String, message: String },

    /// `Authorization` is present but is not `Bearer <token>`
    #[error("Malformed authorization header: {0}")]
    MalformedAuthHeader(String),

    /// The token could not be split into header, payload and signature
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The token declares an algorithm outside the permitted family
    #[error("Algorithm '{alg}' not allowed")]
    NotAllowedAlgorithm { alg: String },

    /// The token header carries no `kid`
    #[error("Token header has no kid")]
    MissingKid,

    /// The `kid` is not in the current key set snapshot
    #[error("Unknown signing key '{kid}'")]
    UnknownKey { kid: String },

    /// Signature verification failed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// exp / nbf / iss / aud check failed
    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    /// No key set has been loaded yet
    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// Fetching or parsing the remote key set document failed
    #[error("Key set fetch error: {message}")]
    KeySetFetch {
        message: String,
        status_code: Option<u16>,
    },

    /// Invalid static configuration
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },
}

impl FilterError {
    /// Create a header I/O error
    pub fn header_io(header: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HeaderIo {
            header: header.into(),
            message: message.into(),
        }
    }

    /// Create a key set fetch error
    pub fn key_set_fetch(message: impl Into<String>) -> Self {
        Self::KeySetFetch {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a key set fetch error carrying the HTTP status
    pub fn key_set_fetch_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::KeySetFetch {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: None,
        }
    }

    /// Create a configuration error with key context
    pub fn configuration_with_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Stable label for logs and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HeaderIo { .. } => "header_io_error",
            Self::MalformedAuthHeader(_) => "malformed_auth_header",
            Self::MalformedToken(_) => "malformed_token",
            Self::NotAllowedAlgorithm { .. } => "not_allowed_algorithm",
            Self::MissingKid => "missing_kid",
            Self::UnknownKey { .. } => "unknown_key",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::InvalidClaims(_) => "invalid_claims",
            Self::KeySetUnavailable(_) => "key_set_unavailable",
            Self::KeySetFetch { .. } => "key_set_fetch_error",
            Self::Configuration { .. } => "configuration_error",
        }
    }

    /// Only a header I/O fault may block a request
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HeaderIo { .. })
    }
}

impl From<crate::config::ConfigError> for FilterError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
