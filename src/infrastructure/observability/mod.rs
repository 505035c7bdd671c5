//! Observability infrastructure - Tracing, Metrics, and exporters

mod config;
mod database;
mod error_reporting;
pub(crate) mod exporter;
mod http_client;
mod metrics;
mod pool_sampler;
mod propagation;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use database::{DatabaseEngine, QueryTracer, bind_query_tracer, query_tracer, trace_query};
pub use error_reporting::init_error_reporting;
pub use exporter::{OtlpEndpoint, TransportSecurity, service_resource};
pub(crate) use http_client::INSTRUMENTATION_SCOPE;
pub use http_client::TracedHttpClient;
pub use metrics::{
    DB_CONNECTION_POOL_SIZE, HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_INPROGRESS,
    HTTP_REQUESTS_TOTAL, ITEMS_CREATED_TOTAL, InFlightRequest, LOGIN_ATTEMPTS_TOTAL,
    LoginResult, METRIC_FAMILIES, METRICS_PATH, MetricFamily, MetricKind, MetricsRegistry,
    PROMETHEUS_CONTENT_TYPE, PrometheusMetrics, UNHANDLED_EXCEPTIONS_TOTAL,
    create_metrics_router, init_metrics, install_recorder, record_http_request,
    record_item_created, record_login_attempt, record_unhandled_exception,
};
pub use pool_sampler::{
    PoolEventHub, PoolGaugeSampler, PoolGaugeValues, pool_gauge_values, refresh,
    register_pool_metrics,
};
pub use propagation::{HeaderExtractor, HeaderInjector, extract_context, inject_context};
pub use tracing_setup::{TracingBootstrap, build_sampler, init_tracing, shutdown_tracing};
