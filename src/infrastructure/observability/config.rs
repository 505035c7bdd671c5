//! Telemetry configuration

use serde::Deserialize;

use crate::domain::TelemetryError;

/// OpenTelemetry export configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Enable OTLP span and log export
    #[serde(default)]
    pub enabled: bool,
    /// Service name attached to every record and span
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Overrides the version reported in the resource descriptor
    #[serde(default)]
    pub service_version: Option<String>,
    /// Sampling rate for root spans (0.0 to 1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// OTLP collector endpoint (e.g., http://localhost:4317)
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
}

fn default_service_name() -> String {
    "telemetry-core".to_string()
}

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

impl TelemetryConfig {
    /// Version reported to collectors: explicit override, else the crate version
    pub fn resolved_version(&self) -> String {
        self.service_version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(TelemetryError::configuration(format!(
                "telemetry.sampling_rate must be within [0, 1], got {}",
                self.sampling_rate
            )));
        }

        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::configuration(
                "telemetry.service_name must not be empty",
            ));
        }

        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
            service_version: None,
            sampling_rate: default_sampling_rate(),
            otlp_endpoint: default_otlp_endpoint(),
        }
    }
}
