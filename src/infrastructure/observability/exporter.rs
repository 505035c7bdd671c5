//! OTLP exporter plumbing shared by span and log export

use opentelemetry::KeyValue;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::Resource;
use tonic::transport::ClientTlsConfig;

use crate::config::Settings;
use crate::domain::TelemetryError;

/// Transport security derived from the endpoint scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    Insecure,
    Tls,
}

impl TransportSecurity {
    /// Only an explicit `http://` endpoint disables encryption
    pub fn from_endpoint(endpoint: &str) -> Self {
        if endpoint.trim().starts_with("http://") {
            TransportSecurity::Insecure
        } else {
            TransportSecurity::Tls
        }
    }

    pub fn is_insecure(&self) -> bool {
        *self == TransportSecurity::Insecure
    }
}

/// Collector endpoint normalized for the gRPC transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpEndpoint {
    url: String,
    security: TransportSecurity,
}

impl OtlpEndpoint {
    pub fn parse(endpoint: &str) -> Self {
        let endpoint = endpoint.trim();
        let security = TransportSecurity::from_endpoint(endpoint);

        // bare host:port needs a scheme for tonic
        let url = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        };

        Self { url, security }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn security(&self) -> TransportSecurity {
        self.security
    }
}

/// Resource descriptor attached to exported spans and logs
pub fn service_resource(settings: &Settings) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", settings.telemetry.service_name.clone()),
        KeyValue::new("service.version", settings.telemetry.resolved_version()),
        KeyValue::new("deployment.environment", settings.environment.as_str()),
    ])
}

pub(crate) fn build_span_exporter(endpoint: &OtlpEndpoint) -> Result<SpanExporter, TelemetryError> {
    let mut builder = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.url());

    if !endpoint.security().is_insecure() {
        builder = builder.with_tls_config(ClientTlsConfig::new().with_native_roots());
    }

    builder
        .build()
        .map_err(|e| TelemetryError::exporter("otlp-spans", e.to_string()))
}

pub(crate) fn build_log_exporter(endpoint: &OtlpEndpoint) -> Result<LogExporter, TelemetryError> {
    let mut builder = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.url());

    if !endpoint.security().is_insecure() {
        builder = builder.with_tls_config(ClientTlsConfig::new().with_native_roots());
    }

    builder
        .build()
        .map_err(|e| TelemetryError::exporter("otlp-logs", e.to_string()))
}
