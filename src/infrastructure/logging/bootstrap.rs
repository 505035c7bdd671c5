//! One-time wiring of the event pipeline into the global subscriber

use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::{Lazy, OnceCell};
use opentelemetry_sdk::trace::Tracer;
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use super::correlation::{CurrentOtelContext, SpanContextSource};
use super::layer::EventPipelineLayer;
use super::processors::{Pipeline, ServiceIdentity};
use super::sinks::{ConsoleSink, OtlpLogSink, RendererKind, SinkSet};
use crate::config::Settings;
use crate::domain::{InitCell, TelemetryError};

type SpanExportLayer = Option<OpenTelemetryLayer<Registry, Tracer>>;

/// Handle to the span-export slot of the global subscriber, filled by the
/// tracing bootstrap once a tracer exists
static SPAN_EXPORT_SLOT: OnceCell<reload::Handle<SpanExportLayer, Registry>> = OnceCell::new();

/// Installs the pipeline layer behind every logging call site
pub trait CallSiteInstrumentor: Send + Sync {
    fn instrument(&self, layer: EventPipelineLayer) -> Result<(), TelemetryError>;
}

/// Installs the process-global `tracing` subscriber and the `log` bridge.
///
/// `RUST_LOG`, when set, narrows which events reach the pipeline. Errors are
/// also forwarded to the error reporting client once one is bound.
#[derive(Debug, Default)]
pub struct GlobalSubscriber;

impl CallSiteInstrumentor for GlobalSubscriber {
    fn instrument(&self, layer: EventPipelineLayer) -> Result<(), TelemetryError> {
        let (span_export, handle) = reload::Layer::<SpanExportLayer, Registry>::new(None);

        tracing_subscriber::registry()
            .with(span_export)
            .with(EnvFilter::try_from_default_env().ok())
            .with(layer)
            .with(sentry_tracing::layer())
            .try_init()
            .map_err(|e| TelemetryError::subscriber(e.to_string()))?;

        let _ = SPAN_EXPORT_SLOT.set(handle);
        Ok(())
    }
}

/// Starts exporting `tracing` spans through `tracer`.
///
/// Returns false when the global subscriber was never installed.
pub fn install_span_export(tracer: Tracer) -> Result<bool, TelemetryError> {
    let Some(handle) = SPAN_EXPORT_SLOT.get() else {
        return Ok(false);
    };

    handle
        .reload(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
        .map_err(|e| TelemetryError::instrumentation(format!("span export: {}", e)))?;
    Ok(true)
}

/// Coordinates the one-time wiring of log sinks.
///
/// Holds three independent pieces of state: whether sinks are configured,
/// whether the call sites are instrumented, and the remote sink handle.
pub struct LoggingBootstrap {
    configured: InitCell,
    instrumented: InitCell,
    remote: OnceCell<Arc<OtlpLogSink>>,
    sinks: Arc<ArcSwap<SinkSet>>,
    writer: Arc<BoxMakeWriter>,
    spans: Arc<dyn SpanContextSource>,
    instrumentor: Box<dyn CallSiteInstrumentor>,
}

impl LoggingBootstrap {
    pub fn new(instrumentor: Box<dyn CallSiteInstrumentor>) -> Self {
        Self::with_parts(
            instrumentor,
            Arc::new(BoxMakeWriter::new(std::io::stdout)),
            Arc::new(CurrentOtelContext),
        )
    }

    pub fn with_parts(
        instrumentor: Box<dyn CallSiteInstrumentor>,
        writer: Arc<BoxMakeWriter>,
        spans: Arc<dyn SpanContextSource>,
    ) -> Self {
        Self {
            configured: InitCell::new(),
            instrumented: InitCell::new(),
            remote: OnceCell::new(),
            sinks: Arc::new(ArcSwap::from_pointee(SinkSet::disabled(writer.clone()))),
            writer,
            spans,
            instrumentor,
        }
    }

    /// Builds and installs the sink set.
    ///
    /// A no-op returning `Ok(false)` when already configured and `force` is
    /// false. With `force` the whole sink set is rebuilt and swapped in one
    /// step; the remote sink and call-site instrumentation are never redone.
    pub fn initialize(&self, settings: &Settings, force: bool) -> Result<bool, TelemetryError> {
        let Some(ticket) = self.configured.begin(force) else {
            return Ok(false);
        };

        let sinks = self.build_sinks(settings)?;

        if let Some(instrumenting) = self.instrumented.begin(false) {
            self.instrumentor.instrument(self.layer())?;
            instrumenting.complete();
        }

        self.sinks.store(Arc::new(sinks));
        ticket.complete();

        tracing::debug!(
            environment = settings.environment.as_str(),
            level = settings.effective_log_level().as_str(),
            remote = self.remote.get().is_some(),
            "Logging configured"
        );

        Ok(true)
    }

    fn build_sinks(&self, settings: &Settings) -> Result<SinkSet, TelemetryError> {
        let identity = ServiceIdentity {
            service: settings.telemetry.service_name.clone(),
            environment: settings.environment.as_str().to_string(),
        };

        Ok(SinkSet {
            level: settings.effective_log_level().to_level_filter(),
            pipeline: Pipeline::standard(identity, self.spans.clone()),
            console: ConsoleSink::new(
                RendererKind::for_environment(settings.environment),
                self.writer.clone(),
            ),
            remote: self.remote_sink(settings)?,
        })
    }

    fn remote_sink(&self, settings: &Settings) -> Result<Option<Arc<OtlpLogSink>>, TelemetryError> {
        if !settings.telemetry.enabled {
            return Ok(None);
        }

        self.remote
            .get_or_try_init(|| OtlpLogSink::new(settings).map(Arc::new))
            .map(|sink| Some(sink.clone()))
    }

    pub fn layer(&self) -> EventPipelineLayer {
        EventPipelineLayer::new(self.sinks.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.configured.is_ready()
    }

    pub fn is_instrumented(&self) -> bool {
        self.instrumented.is_ready()
    }

    /// The routing table currently receiving events
    pub fn sinks(&self) -> Arc<SinkSet> {
        self.sinks.load_full()
    }

    pub fn effective_level(&self) -> LevelFilter {
        self.sinks.load().level
    }

    pub fn remote_sink_handle(&self) -> Option<Arc<OtlpLogSink>> {
        self.remote.get().cloned()
    }

    /// Flushes queued remote records
    pub fn shutdown(&self) {
        if let Some(remote) = self.remote.get() {
            remote.shutdown();
        }
    }
}

static LOGGING: Lazy<LoggingBootstrap> =
    Lazy::new(|| LoggingBootstrap::new(Box::new(GlobalSubscriber)));

/// Process-wide logging setup, see [`LoggingBootstrap::initialize`]
pub fn setup_logging(settings: &Settings, force: bool) -> Result<bool, TelemetryError> {
    LOGGING.initialize(settings, force)
}

pub fn shutdown_logging() {
    LOGGING.shutdown();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use opentelemetry::trace::SpanContext;
    use serde_json::Value;
    use tracing::Level;

    use super::*;
    use crate::config::Environment;
    use crate::domain::EventRecord;
    use crate::infrastructure::logging::correlation::tests::FixedSpanContext;
    use crate::infrastructure::logging::processors::EventContext;
    use crate::infrastructure::logging::sinks::tests::CapturedOutput;

    #[derive(Clone, Default)]
    struct CountingInstrumentor(Arc<AtomicUsize>);

    impl CallSiteInstrumentor for CountingInstrumentor {
        fn instrument(&self, _layer: EventPipelineLayer) -> Result<(), TelemetryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RejectingInstrumentor;

    impl CallSiteInstrumentor for RejectingInstrumentor {
        fn instrument(&self, _layer: EventPipelineLayer) -> Result<(), TelemetryError> {
            Err(TelemetryError::subscriber("a global default subscriber is already set"))
        }
    }

    fn bootstrap(output: &CapturedOutput, instrumentor: CountingInstrumentor) -> LoggingBootstrap {
        LoggingBootstrap::with_parts(
            Box::new(instrumentor),
            output.make_writer(),
            Arc::new(FixedSpanContext(SpanContext::empty_context())),
        )
    }

    fn settings(environment: Environment) -> Settings {
        Settings {
            environment,
            ..Settings::default()
        }
    }

    fn emit(sinks: &SinkSet, message: &str) {
        let ctx = EventContext::new("test.logging", Level::INFO);
        sinks.dispatch(&ctx, EventRecord::with_event(message), true);
    }

    #[test]
    fn test_setup_logging_local_uses_console_renderer() {
        let output = CapturedOutput::default();
        let logging = bootstrap(&output, CountingInstrumentor::default());

        assert!(logging.initialize(&settings(Environment::Local), false).unwrap());

        assert_eq!(logging.effective_level(), LevelFilter::DEBUG);
        let sinks = logging.sinks();
        assert_eq!(sinks.console.kind(), RendererKind::Console);
        assert!(sinks.remote.is_none());

        emit(&sinks, "console output");
        let line = &output.lines()[0];
        assert!(line.contains("console output"));
        assert!(!line.trim_start().starts_with('{'));
    }

    #[test]
    fn test_setup_logging_non_local_uses_json_renderer() {
        let output = CapturedOutput::default();
        let logging = bootstrap(&output, CountingInstrumentor::default());

        logging
            .initialize(&settings(Environment::Production), false)
            .unwrap();

        assert_eq!(logging.effective_level(), LevelFilter::WARN);

        emit(&logging.sinks(), "json output");
        let parsed: Value = serde_json::from_str(&output.lines()[0]).unwrap();
        assert_eq!(parsed["message"], "json output");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["service"], "telemetry-core");
        assert_eq!(parsed["environment"], "production");
        assert!(parsed.get("timestamp").is_some());
    }

    #[test]
    fn test_setup_logging_is_idempotent() {
        let output = CapturedOutput::default();
        let instrumentor = CountingInstrumentor::default();
        let logging = bootstrap(&output, instrumentor.clone());

        assert!(logging.initialize(&settings(Environment::Local), false).unwrap());
        let first = logging.sinks();
        assert!(!logging.initialize(&settings(Environment::Local), false).unwrap());
        let second = logging.sinks();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(instrumentor.0.load(Ordering::SeqCst), 1);
        assert!(logging.is_configured());
        assert!(logging.is_instrumented());
    }

    #[test]
    fn test_force_rebuilds_sinks_but_instruments_once() {
        let output = CapturedOutput::default();
        let instrumentor = CountingInstrumentor::default();
        let logging = bootstrap(&output, instrumentor.clone());

        logging.initialize(&settings(Environment::Local), false).unwrap();
        let first = logging.sinks();
        assert!(logging
            .initialize(&settings(Environment::Production), true)
            .unwrap());
        let second = logging.sinks();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.console.kind(), RendererKind::Json);
        assert_eq!(logging.effective_level(), LevelFilter::WARN);
        assert_eq!(instrumentor.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_log_level_override() {
        let output = CapturedOutput::default();
        let logging = bootstrap(&output, CountingInstrumentor::default());
        let settings = Settings {
            environment: Environment::Production,
            log_level: Some(crate::config::LogLevel::Debug),
            ..Settings::default()
        };

        logging.initialize(&settings, false).unwrap();

        assert_eq!(logging.effective_level(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_failed_instrumentation_keeps_previous_sinks() {
        let output = CapturedOutput::default();
        let logging = LoggingBootstrap::with_parts(
            Box::new(RejectingInstrumentor),
            output.make_writer(),
            Arc::new(FixedSpanContext(SpanContext::empty_context())),
        );

        let result = logging.initialize(&settings(Environment::Local), false);

        assert!(matches!(result, Err(TelemetryError::Subscriber { .. })));
        assert!(!logging.is_configured());
        assert!(!logging.is_instrumented());
        assert_eq!(logging.effective_level(), LevelFilter::OFF);
    }

    #[test]
    fn test_uninitialized_bootstrap_drops_events() {
        let output = CapturedOutput::default();
        let logging = bootstrap(&output, CountingInstrumentor::default());

        assert_eq!(logging.effective_level(), LevelFilter::OFF);
        assert!(!logging.is_configured());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_sink_constructed_once() {
        let output = CapturedOutput::default();
        let logging = bootstrap(&output, CountingInstrumentor::default());
        let mut settings = settings(Environment::Production);
        settings.telemetry.enabled = true;
        settings.telemetry.otlp_endpoint = "http://localhost:4317".to_string();

        logging.initialize(&settings, false).unwrap();
        let first = logging.remote_sink_handle().expect("remote sink");
        logging.initialize(&settings, true).unwrap();
        let second = logging.remote_sink_handle().expect("remote sink");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.endpoint().security().is_insecure());
        let installed = logging.sinks().remote.clone().expect("remote sink installed");
        assert!(Arc::ptr_eq(&installed, &first));
    }
}
