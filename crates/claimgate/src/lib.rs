//! # claimgate - Identity Header Filter
//!
//! Request-time authentication filter for reverse proxies. It strips
//! identity headers a caller could spoof, verifies the bearer token against
//! a periodically refreshed key set, and re-injects the verified claims as
//! those same headers.
//!
//! ## Design Principles
//!
//! - **Strip first**: identity headers are removed before anything else runs
//! - **Fail open on identity, closed on stripping**: a bad or missing token
//!   only means "unauthenticated"; a failed strip blocks the request
//! - **Snapshot key set**: requests read an immutable key set that the
//!   refresh task swaps atomically
//!
//! ## Architecture
//!
//! - [`headers`] - Strip / inject table, host capability trait, sanitizer, bearer extractor
//! - [`validator`] - Token validation and the permitted algorithm family
//! - [`jwks`] - Key set store, document parsing, fetching and refresh
//! - [`claims`] - Verified claims and their projection onto headers
//! - [`filter`] - The per-request orchestrator and its lifecycle entry points
//! - [`config`] - Static configuration, from code or from file + environment
//! - `tower` - Tower middleware (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use claimgate::{ClaimFilter, FilterConfig, HeaderMapHost};
//!
//! let config = FilterConfig::default().with_jwks_uri("https://auth.example.com/.well-known/jwks.json");
//! let filter = Arc::new(ClaimFilter::on_start(config)?);
//! let _refresh = Arc::clone(&filter).spawn_refresh();
//!
//! // Per request, over an http::HeaderMap
//! let outcome = filter.on_request(&mut HeaderMapHost::new(req.headers_mut()));
//! if !outcome.should_continue() {
//!     // a local 500 response was recorded
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower `Layer` / `Service` over `http::Request`
//! - `cli` - the `claimgate` operator binary

pub mod claims;
pub mod config;
pub mod error;
pub mod filter;
pub mod headers;
pub mod jwks;
pub mod validator;

#[cfg(feature = "middleware")]
pub mod tower;

#[cfg(feature = "cli")]
pub mod cli;

#[doc(inline)]
pub use claims::{ClaimValue, ProjectionSummary, TokenHeader, VerifiedClaims, project};
#[doc(inline)]
pub use config::{ConfigError, FilterConfig, HeaderMapping};
pub use error::{FilterError, FilterResult};
#[doc(inline)]
pub use filter::{ClaimFilter, Outcome};
#[doc(inline)]
pub use headers::{
    HeaderMapHost, HostRequest, Rejection, SanitizedHeaderMap, extract_bearer, sanitize,
};
#[doc(inline)]
pub use jwks::{HttpKeySetFetcher, KeySet, KeySetFetcher, KeySetStore, SigningKey};
#[doc(inline)]
pub use validator::{AlgorithmFamily, TokenValidator};
