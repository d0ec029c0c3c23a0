//! # Tower middleware
//!
//! Runs [`ClaimFilter`](crate::ClaimFilter) over the headers of an
//! `http::Request` before it reaches the inner service:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tower::ServiceBuilder;
//! use claimgate::{ClaimFilter, FilterConfig};
//! use claimgate::tower::ClaimLayer;
//!
//! let filter = Arc::new(ClaimFilter::on_start(FilterConfig::from_file("claimgate.toml")?)?);
//! let _refresh = Arc::clone(&filter).spawn_refresh();
//!
//! let service = ServiceBuilder::new()
//!     .layer(ClaimLayer::from_arc(filter))
//!     .service(upstream);
//! ```
//!
//! ## Request Extensions
//!
//! The [`Outcome`](crate::Outcome) of the run is inserted into the request's
//! extensions, so the inner service can tell verified identity headers from
//! an anonymous request:
//!
//! ```rust,ignore
//! if req.extensions().get::<Outcome>().is_some_and(Outcome::is_authenticated) {
//!     // org / user_uuid / principal_type came from a verified token
//! }
//! ```
//!
//! When sanitization fails the inner service is not called and the
//! configured plaintext error response is returned instead.

mod layer;
mod service;

pub use layer::ClaimLayer;
pub use service::{ClaimService, ClaimServiceFuture};
