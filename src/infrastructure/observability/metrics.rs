//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tower_http::compression::CompressionLayer;

use crate::api::middleware::{ExcludedPaths, capture_unhandled_exceptions, track_http_requests};
use crate::config::Settings;
use crate::domain::{InitCell, TelemetryError};

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const HTTP_REQUESTS_INPROGRESS: &str = "http_requests_inprogress";
pub const UNHANDLED_EXCEPTIONS_TOTAL: &str = "unhandled_exceptions_total";
pub const DB_CONNECTION_POOL_SIZE: &str = "db_connection_pool_size";
pub const LOGIN_ATTEMPTS_TOTAL: &str = "login_attempts_total";
pub const ITEMS_CREATED_TOTAL: &str = "items_created_total";

pub const METRICS_PATH: &str = "/metrics";
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const DURATION_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// A metric declared at process start
#[derive(Debug, Clone, Copy)]
pub struct MetricFamily {
    pub name: &'static str,
    pub kind: MetricKind,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub const METRIC_FAMILIES: [MetricFamily; 7] = [
    MetricFamily {
        name: HTTP_REQUESTS_TOTAL,
        kind: MetricKind::Counter,
        help: "Total number of requests by method, handler and status",
        labels: &["method", "handler", "status"],
    },
    MetricFamily {
        name: HTTP_REQUEST_DURATION_SECONDS,
        kind: MetricKind::Histogram,
        help: "Latency with many buckets but no API specific labels",
        labels: &["method", "handler"],
    },
    MetricFamily {
        name: HTTP_REQUESTS_INPROGRESS,
        kind: MetricKind::Gauge,
        help: "Number of HTTP requests in progress",
        labels: &["method", "handler"],
    },
    MetricFamily {
        name: UNHANDLED_EXCEPTIONS_TOTAL,
        kind: MetricKind::Counter,
        help: "Total number of unhandled exceptions",
        labels: &["exception_type", "path"],
    },
    MetricFamily {
        name: DB_CONNECTION_POOL_SIZE,
        kind: MetricKind::Gauge,
        help: "Current database connection pool size",
        labels: &["state"],
    },
    MetricFamily {
        name: LOGIN_ATTEMPTS_TOTAL,
        kind: MetricKind::Counter,
        help: "Total number of login attempts",
        labels: &["result"],
    },
    MetricFamily {
        name: ITEMS_CREATED_TOTAL,
        kind: MetricKind::Counter,
        help: "Total number of items created",
        labels: &[],
    },
];

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Exposition text; declared families without series still get their
    /// `# HELP` and `# TYPE` lines
    pub fn render(&self) -> String {
        with_declared_families(self.handle.render())
    }
}

fn with_declared_families(mut output: String) -> String {
    for family in &METRIC_FAMILIES {
        if output.contains(&format!("# TYPE {} ", family.name)) {
            continue;
        }
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&format!(
            "# HELP {name} {help}\n# TYPE {name} {kind}\n",
            name = family.name,
            help = family.help,
            kind = family.kind.as_str(),
        ));
    }
    output
}

static RECORDER: OnceCell<PrometheusMetrics> = OnceCell::new();

/// Installs the process-global Prometheus recorder, once
pub fn install_recorder() -> Result<PrometheusMetrics, TelemetryError> {
    RECORDER
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .set_buckets_for_metric(
                    Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
                    &DURATION_BUCKETS,
                )
                .map_err(|e| TelemetryError::recorder(e.to_string()))?
                .install_recorder()
                .map_err(|e| TelemetryError::recorder(e.to_string()))?;

            describe_families();
            tracing::debug!("Prometheus recorder installed");

            Ok(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        })
        .cloned()
}

fn describe_families() {
    for family in &METRIC_FAMILIES {
        match family.kind {
            MetricKind::Counter => describe_counter!(family.name, family.help),
            MetricKind::Gauge => describe_gauge!(family.name, family.help),
            MetricKind::Histogram => {
                describe_histogram!(family.name, Unit::Seconds, family.help)
            }
        }
    }
}

/// Create the metrics router
pub fn create_metrics_router(metrics: PrometheusMetrics) -> Router {
    Router::new()
        .route(METRICS_PATH, get(metrics_handler))
        .layer(CompressionLayer::new())
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        metrics.render(),
    )
}

/// Record a completed HTTP request
pub fn record_http_request(method: &str, handler: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("handler", handler.to_string()),
    ];

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "handler" => handler.to_string(),
        "status" => status_class(status)
    )
    .increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

/// Status codes are grouped as `2xx`, `4xx`, ...
fn status_class(status: u16) -> String {
    format!("{}xx", status / 100)
}

/// Tracks one in-flight request; the gauge is decremented on drop, including
/// when the handler unwinds
pub struct InFlightRequest {
    method: String,
    handler: String,
}

impl InFlightRequest {
    pub fn start(method: &str, handler: &str) -> Self {
        gauge!(
            HTTP_REQUESTS_INPROGRESS,
            "method" => method.to_string(),
            "handler" => handler.to_string()
        )
        .increment(1.0);

        Self {
            method: method.to_string(),
            handler: handler.to_string(),
        }
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        gauge!(
            HTTP_REQUESTS_INPROGRESS,
            "method" => self.method.clone(),
            "handler" => self.handler.clone()
        )
        .decrement(1.0);
    }
}

pub fn record_unhandled_exception(exception_type: &str, path: &str) {
    counter!(
        UNHANDLED_EXCEPTIONS_TOTAL,
        "exception_type" => exception_type.to_string(),
        "path" => path.to_string()
    )
    .increment(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResult {
    Success,
    Failure,
}

impl LoginResult {
    pub const ALL: [LoginResult; 2] = [LoginResult::Success, LoginResult::Failure];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoginResult::Success => "success",
            LoginResult::Failure => "failure",
        }
    }
}

pub fn record_login_attempt(result: LoginResult) {
    counter!(LOGIN_ATTEMPTS_TOTAL, "result" => result.as_str()).increment(1);
}

pub fn record_item_created() {
    counter!(ITEMS_CREATED_TOTAL).increment(1);
}

/// Creates both login series at zero so they exist before the first login
fn register_login_series() {
    for result in LoginResult::ALL {
        counter!(LOGIN_ATTEMPTS_TOTAL, "result" => result.as_str()).increment(0);
    }
}

/// Attaches HTTP instrumentation and the `/metrics` route to an application
pub struct MetricsRegistry {
    state: InitCell,
    excluded: ExcludedPaths,
}

impl MetricsRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            state: InitCell::new(),
            excluded: ExcludedPaths::new([METRICS_PATH.to_string(), settings.health_check_path()]),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    /// Instruments `router`. Later calls return the router untouched.
    ///
    /// Installs a plain 404 fallback so requests matching no route are
    /// counted under the `none` handler; a fallback set earlier is replaced.
    pub fn init(&self, router: Router) -> Result<Router, TelemetryError> {
        let Some(ticket) = self.state.begin(false) else {
            tracing::debug!("Metrics already initialized, skipping");
            return Ok(router);
        };

        let metrics = install_recorder()?;
        register_login_series();

        let router = router
            .fallback(not_found)
            .layer(middleware::from_fn(capture_unhandled_exceptions))
            .layer(middleware::from_fn_with_state(
                self.excluded.clone(),
                track_http_requests,
            ))
            .merge(create_metrics_router(metrics));

        ticket.complete();
        tracing::info!("Prometheus metrics initialized at {}", METRICS_PATH);

        Ok(router)
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

static METRICS: OnceCell<MetricsRegistry> = OnceCell::new();

/// Process-wide metrics registry
pub fn init_metrics(router: Router, settings: &Settings) -> Result<Router, TelemetryError> {
    METRICS
        .get_or_init(|| MetricsRegistry::new(settings))
        .init(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
    }

    #[test]
    fn test_declared_families_fill_empty_output() {
        let output = with_declared_families(String::new());

        for family in &METRIC_FAMILIES {
            assert!(output.contains(&format!("# TYPE {} {}", family.name, family.kind.as_str())));
            assert!(output.contains(&format!("# HELP {} ", family.name)));
        }
    }

    #[test]
    fn test_declared_families_do_not_duplicate_existing_series() {
        let existing = "# TYPE items_created_total counter\nitems_created_total 3\n".to_string();

        let output = with_declared_families(existing);

        assert_eq!(output.matches("# TYPE items_created_total").count(), 1);
        assert!(output.contains("items_created_total 3"));
        assert!(output.contains("# TYPE login_attempts_total counter"));
    }

    #[test]
    fn test_login_results() {
        assert_eq!(LoginResult::Success.as_str(), "success");
        assert_eq!(LoginResult::Failure.as_str(), "failure");
    }

    #[test]
    fn test_family_names_cover_custom_series() {
        for name in [
            UNHANDLED_EXCEPTIONS_TOTAL,
            DB_CONNECTION_POOL_SIZE,
            LOGIN_ATTEMPTS_TOTAL,
            ITEMS_CREATED_TOTAL,
        ] {
            assert!(METRIC_FAMILIES.iter().any(|family| family.name == name));
        }
    }

    #[test]
    fn test_local_recorder_captures_custom_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_login_series();
            record_login_attempt(LoginResult::Failure);
            record_item_created();
            record_unhandled_exception("RuntimeError", "/explode/{item_id}");
        });

        let output = handle.render();
        assert!(output.contains(r#"login_attempts_total{result="success"} 0"#));
        assert!(output.contains(r#"login_attempts_total{result="failure"} 1"#));
        assert!(output.contains("items_created_total 1"));
        assert!(output.contains(r#"exception_type="RuntimeError""#));
    }

    #[test]
    fn test_in_flight_guard_tracks_live_requests() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let first = InFlightRequest::start("GET", "/items/{id}");
            let second = InFlightRequest::start("GET", "/items/{id}");
            drop(first);
            assert_eq!(in_progress(&handle.render()), Some("1"));

            drop(second);
            assert_eq!(in_progress(&handle.render()), Some("0"));
        });
    }

    fn in_progress(output: &str) -> Option<&str> {
        output
            .lines()
            .find(|line| {
                line.starts_with("http_requests_inprogress{")
                    && line.contains(r#"method="GET""#)
                    && line.contains(r#"handler="/items/{id}""#)
            })
            .and_then(|line| line.rsplit(' ').next())
    }
}
