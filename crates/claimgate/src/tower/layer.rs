//! Tower Layer for the claim filter

use std::sync::Arc;
use tower::Layer;

use super::service::ClaimService;
use crate::filter::ClaimFilter;

/// Tower Layer that wraps services with [`ClaimService`]
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use claimgate::tower::ClaimLayer;
///
/// let service = ServiceBuilder::new()
///     .layer(ClaimLayer::new(filter))
///     .service(my_inner_service);
/// ```
#[derive(Debug, Clone)]
pub struct ClaimLayer {
    filter: Arc<ClaimFilter>,
}

impl ClaimLayer {
    /// Create a layer owning the filter
    pub fn new(filter: ClaimFilter) -> Self {
        Self {
            filter: Arc::new(filter),
        }
    }

    /// Create a layer from a shared filter, e.g. one also driving
    /// [`ClaimFilter::spawn_refresh`]
    pub fn from_arc(filter: Arc<ClaimFilter>) -> Self {
        Self { filter }
    }

    /// The wrapped filter
    pub fn filter(&self) -> &Arc<ClaimFilter> {
        &self.filter
    }
}

impl<S> Layer<S> for ClaimLayer {
    type Service = ClaimService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClaimService::new(inner, Arc::clone(&self.filter))
    }
}
