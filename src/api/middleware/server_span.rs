//! Server spans for inbound requests

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use opentelemetry::global;
use opentelemetry::trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::KeyValue;

use super::metrics::path_label;
use crate::infrastructure::observability::{INSTRUMENTATION_SCOPE, extract_context};

/// Wraps each request in a server span continuing any W3C parent found in
/// the request headers.
///
/// The span context is attached to the request future, so every log written
/// while handling the request is correlated with it.
pub async fn http_server_span(request: Request<Body>, next: Next) -> Response {
    let parent = extract_context(request.headers());
    let method = request.method().as_str().to_string();
    let route = path_label(&request);

    let mut attributes = vec![
        KeyValue::new("http.request.method", method.clone()),
        KeyValue::new("http.route", route.clone()),
        KeyValue::new("url.path", request.uri().path().to_string()),
    ];
    if let Some(query) = request.uri().query() {
        attributes.push(KeyValue::new("url.query", query.to_string()));
    }

    let tracer = global::tracer(INSTRUMENTATION_SCOPE);
    let span = tracer
        .span_builder(format!("{} {}", method, route))
        .with_kind(SpanKind::Server)
        .with_attributes(attributes)
        .start_with_context(&tracer, &parent);
    let cx = parent.with_span(span);

    let response = next.run(request).with_context(cx.clone()).await;

    let span = cx.span();
    let status = response.status();
    span.set_attribute(KeyValue::new(
        "http.response.status_code",
        i64::from(status.as_u16()),
    ));
    if status.is_server_error() {
        span.set_status(Status::error(status.to_string()));
    }
    span.end();

    response
}
