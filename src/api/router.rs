use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use super::health;
use crate::config::Settings;
use crate::domain::TelemetryError;
use crate::infrastructure::observability::{DatabaseEngine, init_metrics, init_tracing};

/// Application routes before any instrumentation is attached
pub fn create_router(settings: &Settings) -> Router {
    Router::new()
        .route(&settings.health_check_path(), get(health::health_check))
        .layer(TraceLayer::new_for_http())
}

/// Application routes with tracing and metrics attached.
///
/// The layer added last runs first, so tracing is attached after metrics:
/// the server span then encloses exception capture and request metrics, and
/// their logs carry the request's trace context.
pub fn create_instrumented_router(
    settings: &Settings,
    database: Option<DatabaseEngine>,
) -> Result<Router, TelemetryError> {
    let router = init_metrics(create_router(settings), settings)?;
    init_tracing(router, settings, database)
}
