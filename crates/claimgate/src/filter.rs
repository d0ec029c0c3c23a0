//! Request filter orchestrator
//!
//! Three entry points driven by the host:
//! - [`ClaimFilter::on_start`] once, with the static configuration
//! - [`ClaimFilter::on_request`] per request, synchronously
//! - [`ClaimFilter::on_timer`] per refresh tick
//!
//! Per request: sanitize, then extract, then validate, then project. Only a
//! sanitization fault blocks the request; every later failure is logged and
//! the request continues without injected identity headers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::claims::project;
use crate::config::FilterConfig;
use crate::error::{FilterError, FilterResult};
use crate::headers::{AUTHORIZATION, HostRequest, SanitizedHeaderMap, extract_bearer, sanitize};
use crate::jwks::{self, HttpKeySetFetcher, KeySetFetcher, KeySetStore};
use crate::validator::TokenValidator;

const CONTENT_TYPE_TEXT: (&str, &str) = ("content-type", "text/plain");

/// Terminal state of one request's pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Token verified; `injected` identity headers were written
    ContinueAuthenticated { injected: usize },
    /// No verified identity; `reason` is the failure kind label
    ContinueUnauthenticated { reason: &'static str },
    /// Sanitization failed and a local error response was sent
    FailClosed { status: u16 },
}

impl Outcome {
    /// Reason used when the request carries no `Authorization` header
    pub const NO_AUTHORIZATION: &'static str = "no_authorization";

    /// Whether the request may proceed downstream
    pub fn should_continue(&self) -> bool {
        !matches!(self, Self::FailClosed { .. })
    }

    /// Whether identity headers were derived from a verified token
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::ContinueAuthenticated { .. })
    }
}

/// The authentication filter
#[derive(Debug)]
pub struct ClaimFilter {
    header_map: SanitizedHeaderMap,
    store: Arc<KeySetStore>,
    validator: TokenValidator,
    fetcher: Option<Arc<dyn KeySetFetcher>>,
    refresh_interval: Duration,
    error_status: u16,
    error_body: String,
}

impl ClaimFilter {
    /// Build the filter from static configuration
    ///
    /// The key set store starts empty; tokens are rejected with
    /// `UnknownKey` until the first refresh completes. When `jwks_uri` is
    /// set an HTTP fetcher is created for it.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Configuration` when the configuration is
    /// invalid.
    pub fn on_start(config: FilterConfig) -> FilterResult<Self> {
        let fetcher = match &config.jwks_uri {
            Some(uri) => Some(Arc::new(HttpKeySetFetcher::new(uri, config.fetch_timeout())?)
                as Arc<dyn KeySetFetcher>),
            None => {
                warn!("No jwks_uri configured, key set will never be refreshed");
                None
            }
        };
        Self::build(config, fetcher)
    }

    /// Build the filter with a caller-supplied key set source
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Configuration` when the configuration is
    /// invalid.
    pub fn with_fetcher(config: FilterConfig, fetcher: Arc<dyn KeySetFetcher>) -> FilterResult<Self> {
        Self::build(config, Some(fetcher))
    }

    fn build(config: FilterConfig, fetcher: Option<Arc<dyn KeySetFetcher>>) -> FilterResult<Self> {
        config.validate()?;
        let header_map = config.sanitized_header_map()?;

        let store = Arc::new(KeySetStore::new());
        let mut validator = TokenValidator::new(Arc::clone(&store), config.algorithm_family)
            .with_leeway(Duration::from_secs(config.leeway_secs));
        if let Some(issuer) = &config.issuer {
            validator = validator.with_issuer(issuer);
        }
        if let Some(audience) = &config.audience {
            validator = validator.with_audience(audience);
        }

        info!(
            algorithm_family = ?config.algorithm_family,
            headers = header_map.len(),
            refresh_interval_secs = config.refresh_interval_secs,
            key_source = fetcher.as_ref().map(|f| f.source()),
            "Claim filter started"
        );

        Ok(Self {
            header_map,
            store,
            validator,
            fetcher,
            refresh_interval: config.refresh_interval(),
            error_status: config.error_status,
            error_body: config.error_body,
        })
    }

    /// Run the pipeline over one request
    pub fn on_request<H>(&self, host: &mut H) -> Outcome
    where
        H: HostRequest + ?Sized,
    {
        if let Err(e) = sanitize(host, &self.header_map) {
            return self.fail_closed(host, &e);
        }

        let Some(authorization) = host
            .get_request_header(AUTHORIZATION)
            .filter(|v| !v.trim().is_empty())
        else {
            debug!("No authorization header, continuing unauthenticated");
            return Outcome::ContinueUnauthenticated {
                reason: Outcome::NO_AUTHORIZATION,
            };
        };

        let claims = match extract_bearer(&authorization).and_then(|t| self.validator.validate(t)) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(
                    kind = e.kind(),
                    error = %e,
                    "Token rejected, continuing unauthenticated"
                );
                return Outcome::ContinueUnauthenticated { reason: e.kind() };
            }
        };

        let summary = project(&claims, &self.header_map, host);
        debug!(
            kid = claims.kid(),
            injected = summary.injected.len(),
            missing = summary.missing.len(),
            failed = summary.failed.len(),
            "Identity headers injected"
        );

        Outcome::ContinueAuthenticated {
            injected: summary.injected.len(),
        }
    }

    fn fail_closed<H>(&self, host: &mut H, cause: &FilterError) -> Outcome
    where
        H: HostRequest + ?Sized,
    {
        error!(
            kind = cause.kind(),
            error = %cause,
            status = self.error_status,
            "Header sanitization failed, rejecting request"
        );

        if let Err(e) = host.send_error_response(
            self.error_status,
            &[CONTENT_TYPE_TEXT],
            self.error_body.as_bytes(),
        ) {
            error!(error = %e, "Failed to send error response");
        }

        Outcome::FailClosed {
            status: self.error_status,
        }
    }

    /// One refresh attempt: fetch, parse and replace the key set
    ///
    /// Returns the number of keys now in the store.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::KeySetUnavailable` when no key source is
    /// configured, or `FilterError::KeySetFetch` when the attempt fails. In
    /// both cases the store keeps its current snapshot.
    pub async fn on_timer(&self) -> FilterResult<usize> {
        let Some(fetcher) = &self.fetcher else {
            warn!("Refresh tick without a key set source");
            return Err(FilterError::KeySetUnavailable(
                "no key set source configured".to_string(),
            ));
        };
        jwks::refresh(fetcher.as_ref(), &self.store).await
    }

    /// Drive [`Self::on_timer`] on the configured interval
    ///
    /// The first tick fires immediately so the store is populated as soon
    /// as possible. Abort the returned handle to stop refreshing. Without a
    /// key set source there is nothing to refresh and the task ends at once.
    pub fn spawn_refresh(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.refresh_interval;
        if self.fetcher.is_none() {
            warn!("No key set source, background refresh not started");
            return tokio::spawn(async {});
        }
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Failures are logged inside; the next tick retries
                let _ = self.on_timer().await;
            }
        })
    }

    /// Shared key set store
    pub fn store(&self) -> &Arc<KeySetStore> {
        &self.store
    }

    /// Strip / inject table
    pub fn header_map(&self) -> &SanitizedHeaderMap {
        &self.header_map
    }

    /// Token validator
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Refresh period
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
