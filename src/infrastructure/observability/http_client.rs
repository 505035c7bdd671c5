//! Outbound HTTP client emitting client spans

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use reqwest::{Client, IntoUrl, Method, Request, RequestBuilder, Response};

use super::propagation::inject_context;

pub(crate) const INSTRUMENTATION_SCOPE: &str = "telemetry-core";

/// `reqwest` client that opens a client span per request and forwards the
/// trace context to the remote service
#[derive(Clone)]
pub struct TracedHttpClient<T = BoxedTracer> {
    client: Client,
    tracer: Option<T>,
}

impl TracedHttpClient<BoxedTracer> {
    /// Resolves the process-global tracer on every request, so a client built
    /// before tracing is initialized starts emitting spans once it is
    pub fn new(client: Client) -> Self {
        Self {
            client,
            tracer: None,
        }
    }
}

impl<T> TracedHttpClient<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    pub fn with_tracer(client: Client, tracer: T) -> Self {
        Self {
            client,
            tracer: Some(tracer),
        }
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        match &self.tracer {
            Some(tracer) => self.execute_with(tracer, request).await,
            None => {
                let tracer = global::tracer(INSTRUMENTATION_SCOPE);
                self.execute_with(&tracer, request).await
            }
        }
    }

    async fn execute_with<U>(&self, tracer: &U, mut request: Request) -> reqwest::Result<Response>
    where
        U: Tracer,
        U::Span: Send + Sync + 'static,
    {
        let mut attributes = vec![
            KeyValue::new("http.request.method", request.method().to_string()),
            KeyValue::new("url.full", request.url().to_string()),
        ];
        if let Some(host) = request.url().host_str() {
            attributes.push(KeyValue::new("server.address", host.to_string()));
        }

        let span = tracer
            .span_builder(request.method().to_string())
            .with_kind(SpanKind::Client)
            .with_attributes(attributes)
            .start_with_context(tracer, &Context::current());
        let cx = Context::current_with_span(span);

        inject_context(&cx, request.headers_mut());

        let result = self.client.execute(request).with_context(cx.clone()).await;

        let span = cx.span();
        match &result {
            Ok(response) => {
                let status = response.status();
                span.set_attribute(KeyValue::new(
                    "http.response.status_code",
                    i64::from(status.as_u16()),
                ));
                if status.is_server_error() {
                    span.set_status(Status::error(status.to_string()));
                }
            }
            Err(e) => span.set_status(Status::error(e.to_string())),
        }
        span.end();

        result
    }

    /// Builds and executes `builder` through the traced path
    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        self.execute(builder.build()?).await
    }
}
