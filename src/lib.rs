//! telemetry-core
//!
//! Observability correlation layer for axum services:
//! - Structured event pipeline with console and OTLP log sinks
//! - Trace context correlation between spans and log records
//! - Prometheus metrics with HTTP and unhandled-exception instrumentation
//! - Connection pool gauges driven by pool lifecycle events
//! - OpenTelemetry tracing bootstrap with HTTP, database and client spans

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::Settings;
pub use domain::TelemetryError;
