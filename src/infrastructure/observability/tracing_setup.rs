//! OpenTelemetry distributed tracing setup

use axum::{Router, middleware};
use opentelemetry::{global, trace::TracerProvider as _};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};

use super::database::{DatabaseEngine, QueryTracer, bind_query_tracer};
use super::exporter::{OtlpEndpoint, build_span_exporter, service_resource};
use crate::api::middleware::http_server_span;
use crate::config::Settings;
use crate::domain::{InitCell, TelemetryError};
use crate::infrastructure::logging::install_span_export;

/// Rate-based sampling that is deterministic per trace id and follows the
/// decision of a sampled parent
pub fn build_sampler(rate: f64) -> Sampler {
    Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate)))
}

/// One-time wiring of span export and auto-instrumentation
pub struct TracingBootstrap {
    state: InitCell,
}

impl TracingBootstrap {
    pub const fn new() -> Self {
        Self {
            state: InitCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_ready()
    }

    /// Installs the global tracer and instruments `router`.
    ///
    /// No-op when telemetry is disabled or tracing is already initialized.
    /// Must run inside a tokio runtime, before the first request is served.
    pub fn init(
        &self,
        router: Router,
        settings: &Settings,
        database: Option<DatabaseEngine>,
    ) -> Result<Router, TelemetryError> {
        if !settings.telemetry.enabled {
            tracing::debug!("Tracing disabled by configuration");
            return Ok(router);
        }

        let Some(ticket) = self.state.begin(false) else {
            tracing::debug!("Tracing already initialized, skipping");
            return Ok(router);
        };

        let provider = build_tracer_provider(settings)?;
        let tracer = provider.tracer(settings.telemetry.service_name.clone());

        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(provider);

        if !install_span_export(tracer.clone())? {
            tracing::warn!("Global subscriber not installed; tracing spans will not be exported");
        }

        if let Some(engine) = database {
            let system = engine.system().to_string();
            if !bind_query_tracer(QueryTracer::new(engine, tracer)) {
                tracing::warn!(system = %system, "Query tracer already bound");
            }
        }

        ticket.complete();

        tracing::info!(
            "Tracing initialized with OpenTelemetry export to {} (sampling rate {})",
            settings.telemetry.otlp_endpoint,
            settings.telemetry.sampling_rate
        );

        Ok(router.layer(middleware::from_fn(http_server_span)))
    }
}

impl Default for TracingBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

fn build_tracer_provider(settings: &Settings) -> Result<TracerProvider, TelemetryError> {
    let endpoint = OtlpEndpoint::parse(&settings.telemetry.otlp_endpoint);
    let exporter = build_span_exporter(&endpoint)?;

    let provider = TracerProvider::builder()
        .with_sampler(build_sampler(settings.telemetry.sampling_rate))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(service_resource(settings))
        .with_batch_exporter(exporter, runtime::Tokio)
        .build();

    Ok(provider)
}

static TRACING: TracingBootstrap = TracingBootstrap::new();

/// Process-wide tracing bootstrap
pub fn init_tracing(
    router: Router,
    settings: &Settings,
    database: Option<DatabaseEngine>,
) -> Result<Router, TelemetryError> {
    TRACING.init(router, settings, database)
}

/// Shutdown tracing and flush pending spans
pub fn shutdown_tracing() {
    if TRACING.is_initialized() {
        global::shutdown_tracer_provider();
        tracing::info!("Tracing shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{
        SamplingDecision, SpanContext, SpanId, SpanKind, TraceContextExt, TraceFlags, TraceId,
        TraceState,
    };
    use opentelemetry::Context;
    use opentelemetry_sdk::trace::ShouldSample;

    use super::*;

    fn decide(sampler: &Sampler, parent: Option<&Context>, trace_id: TraceId) -> SamplingDecision {
        sampler
            .should_sample(parent, trace_id, "GET /items", &SpanKind::Server, &[], &[])
            .decision
    }

    fn sampled_parent() -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ))
    }

    fn enabled_settings() -> Settings {
        let mut settings = Settings::default();
        settings.telemetry.enabled = true;
        settings.telemetry.otlp_endpoint = "http://localhost:4317".to_string();
        settings
    }

    #[test]
    fn test_sampler_rate_bounds() {
        let trace_id = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();

        assert_eq!(
            decide(&build_sampler(1.0), None, trace_id),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(decide(&build_sampler(0.0), None, trace_id), SamplingDecision::Drop);
    }

    #[test]
    fn test_sampler_respects_sampled_parent() {
        let trace_id = TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap();
        let parent = sampled_parent();

        assert_eq!(
            decide(&build_sampler(0.0), Some(&parent), trace_id),
            SamplingDecision::RecordAndSample
        );
    }

    #[test]
    fn test_sampler_is_deterministic_per_trace() {
        let sampler = build_sampler(0.5);

        for hex in [
            "00000000000000000000000000000001",
            "7fffffffffffffffffffffffffffffff",
            "ffffffffffffffffffffffffffffffff",
        ] {
            let trace_id = TraceId::from_hex(hex).unwrap();
            assert_eq!(
                decide(&sampler, None, trace_id),
                decide(&sampler, None, trace_id)
            );
        }
    }

    #[test]
    fn test_disabled_tracing_is_noop() {
        let bootstrap = TracingBootstrap::new();

        bootstrap
            .init(Router::new(), &Settings::default(), None)
            .unwrap();

        assert!(!bootstrap.is_initialized());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_init_runs_once() {
        let bootstrap = TracingBootstrap::new();
        let settings = enabled_settings();

        bootstrap.init(Router::new(), &settings, None).unwrap();
        assert!(bootstrap.is_initialized());

        bootstrap.init(Router::new(), &settings, None).unwrap();
        assert!(bootstrap.is_initialized());
    }
}
