//! HTTP metrics middleware for recording request/response metrics

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use futures::FutureExt;

use crate::domain::exception_type_name;
use crate::infrastructure::observability::{
    InFlightRequest, record_http_request, record_unhandled_exception,
};

/// Handler label for requests that matched no route
const UNMATCHED_HANDLER: &str = "none";

/// Paths the HTTP instrumentation ignores
#[derive(Debug, Clone)]
pub struct ExcludedPaths(Arc<[String]>);

impl ExcludedPaths {
    pub fn new(paths: impl IntoIterator<Item = String>) -> Self {
        Self(paths.into_iter().collect())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.iter().any(|excluded| excluded == path)
    }
}

/// Middleware recording request count, latency and in-flight requests.
///
/// A handler panic is counted as a 500 and then resumed.
pub async fn track_http_requests(
    State(excluded): State<ExcludedPaths>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let route = matched_route(&request);
    let raw_path = request.uri().path();
    if excluded.contains(raw_path) || route.as_deref().is_some_and(|r| excluded.contains(r)) {
        return next.run(request).await;
    }

    let method = request.method().as_str().to_string();
    let handler = route.unwrap_or_else(|| UNMATCHED_HANDLER.to_string());

    let _in_flight = InFlightRequest::start(&method, &handler);
    let start = Instant::now();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => {
            record_http_request(&method, &handler, response.status().as_u16(), start.elapsed());
            response
        }
        Err(payload) => {
            record_http_request(
                &method,
                &handler,
                StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                start.elapsed(),
            );
            std::panic::resume_unwind(payload)
        }
    }
}

/// Records panics escaping a handler, then resumes them unchanged
pub async fn capture_unhandled_exceptions(request: Request<Body>, next: Next) -> Response {
    let path = path_label(&request);

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let exception_type = exception_type_name(payload.as_ref());
            record_unhandled_exception(exception_type, &path);
            tracing::error!(exception_type, path = %path, "Unhandled exception in request handler");

            std::panic::resume_unwind(payload)
        }
    }
}

fn matched_route(request: &Request<Body>) -> Option<String> {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
}

/// Route template when one matched, otherwise the raw request path
pub(crate) fn path_label(request: &Request<Body>) -> String {
    matched_route(request).unwrap_or_else(|| request.uri().path().to_string())
}
