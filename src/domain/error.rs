use thiserror::Error;

/// Errors raised while wiring the telemetry subsystem
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Exporter error: {exporter} - {message}")]
    Exporter { exporter: String, message: String },

    #[error("Instrumentation error: {message}")]
    Instrumentation { message: String },

    #[error("Subscriber error: {message}")]
    Subscriber { message: String },

    #[error("Metrics recorder error: {message}")]
    Recorder { message: String },
}

impl TelemetryError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn exporter(exporter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exporter {
            exporter: exporter.into(),
            message: message.into(),
        }
    }

    pub fn instrumentation(message: impl Into<String>) -> Self {
        Self::Instrumentation {
            message: message.into(),
        }
    }

    pub fn subscriber(message: impl Into<String>) -> Self {
        Self::Subscriber {
            message: message.into(),
        }
    }

    pub fn recorder(message: impl Into<String>) -> Self {
        Self::Recorder {
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for TelemetryError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::exporter("otlp-logs", "invalid endpoint");
        assert_eq!(err.to_string(), "Exporter error: otlp-logs - invalid endpoint");

        let err = TelemetryError::configuration("sampling_rate must be within [0, 1]");
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_from_config_error() {
        let err: TelemetryError = config::ConfigError::Message("bad key".to_string()).into();
        assert!(matches!(err, TelemetryError::Configuration { message: _ }));
    }
}
