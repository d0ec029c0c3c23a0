//! Tower Service running the claim filter over HTTP requests

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response, StatusCode};
use tower_service::Service;

use crate::filter::{ClaimFilter, Outcome};
use crate::headers::{HeaderMapHost, Rejection};

/// Tower Service that sanitizes and authenticates request headers
///
/// The filter runs synchronously inside `call`, before the inner service's
/// future is created.
#[derive(Debug, Clone)]
pub struct ClaimService<S> {
    inner: S,
    filter: Arc<ClaimFilter>,
}

impl<S> ClaimService<S> {
    /// Create a new claim service
    pub fn new(inner: S, filter: Arc<ClaimFilter>) -> Self {
        Self { inner, filter }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// The filter applied to each request
    pub fn filter(&self) -> &Arc<ClaimFilter> {
        &self.filter
    }
}

/// Future type for claim service responses
pub type ClaimServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, B, ResBody> Service<Request<B>> for ClaimService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    B: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = ClaimServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let mut host = HeaderMapHost::new(req.headers_mut());
        let outcome = self.filter.on_request(&mut host);
        let rejection = host.into_rejection();

        if let Outcome::FailClosed { status } = outcome {
            let rejection = rejection.unwrap_or_else(|| Rejection {
                status,
                headers: Vec::new(),
                body: Vec::new(),
            });
            let response = rejection_response(rejection);
            return Box::pin(async move { Ok(response) });
        }

        req.extensions_mut().insert(outcome);

        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);
        Box::pin(async move { inner.call(req).await })
    }
}

/// Turn a captured local response into an `http::Response`
fn rejection_response<ResBody: From<String>>(rejection: Rejection) -> Response<ResBody> {
    let body = String::from_utf8_lossy(&rejection.body).into_owned();
    let mut response = Response::new(ResBody::from(body));

    *response.status_mut() =
        StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    for (name, value) in &rejection.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().append(name, value);
        }
    }

    response
}
