//! Error reporting to a Sentry-compatible backend

use sentry::types::Dsn;
use sentry::{ClientInitGuard, ClientOptions};

use crate::config::Settings;
use crate::domain::TelemetryError;

/// Starts the error reporting client when a DSN is configured outside the
/// local environment.
///
/// Events reach it through the `sentry-tracing` layer of the global
/// subscriber; the returned guard must be held until shutdown, dropping it
/// flushes pending events.
pub fn init_error_reporting(settings: &Settings) -> Result<Option<ClientInitGuard>, TelemetryError> {
    let Some(dsn) = settings.error_reporting_dsn() else {
        return Ok(None);
    };

    let dsn: Dsn = dsn
        .parse()
        .map_err(|e| TelemetryError::configuration(format!("Invalid error reporting DSN: {}", e)))?;
    let guard = sentry::init(client_options(settings, dsn));

    tracing::info!(
        environment = settings.environment.as_str(),
        "Error reporting enabled"
    );

    Ok(Some(guard))
}

fn client_options(settings: &Settings, dsn: Dsn) -> ClientOptions {
    ClientOptions {
        dsn: Some(dsn),
        release: Some(settings.telemetry.resolved_version().into()),
        environment: Some(settings.environment.as_str().into()),
        traces_sample_rate: 1.0,
        ..Default::default()
    }
}
