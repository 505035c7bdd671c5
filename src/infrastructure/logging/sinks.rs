//! Console and remote destinations for enriched records

use std::io::Write;
use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, LoggerProvider as _, Severity};
use opentelemetry::Context;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry_sdk::logs::{LogRecord as SdkLogRecord, Logger, LoggerProvider};
use opentelemetry_sdk::runtime;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use super::processors::{EventContext, Pipeline};
use super::render::{ConsoleRenderer, JsonRenderer, Renderer};
use crate::config::{Environment, Settings};
use crate::domain::{EventRecord, TelemetryError};
use crate::infrastructure::observability::exporter::{
    OtlpEndpoint, build_log_exporter, service_resource,
};

/// Which renderer a console sink uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Console,
    Json,
}

impl RendererKind {
    /// Human-readable output locally, JSON everywhere else
    pub fn for_environment(environment: Environment) -> Self {
        if environment.is_local() {
            RendererKind::Console
        } else {
            RendererKind::Json
        }
    }

    fn renderer(self) -> Box<dyn Renderer> {
        match self {
            RendererKind::Console => Box::new(ConsoleRenderer),
            RendererKind::Json => Box::new(JsonRenderer),
        }
    }
}

/// Writes one rendered line per event to a local stream
pub struct ConsoleSink {
    kind: RendererKind,
    renderer: Box<dyn Renderer>,
    writer: Arc<BoxMakeWriter>,
}

impl ConsoleSink {
    pub fn new(kind: RendererKind, writer: Arc<BoxMakeWriter>) -> Self {
        Self {
            kind,
            renderer: kind.renderer(),
            writer,
        }
    }

    pub fn kind(&self) -> RendererKind {
        self.kind
    }

    pub fn format(&self, record: &EventRecord) -> String {
        self.renderer.render(record)
    }

    pub fn emit(&self, record: &EventRecord) {
        let mut line = self.format(record);
        line.push('\n');

        let mut writer = self.writer.make_writer();
        let _ = writer.write_all(line.as_bytes());
    }
}

/// Batched OTLP log export.
///
/// Records are rendered as JSON and queued on the tokio runtime; `emit` never
/// waits on the network.
pub struct OtlpLogSink {
    provider: LoggerProvider,
    logger: Logger,
    renderer: JsonRenderer,
    endpoint: OtlpEndpoint,
}

impl OtlpLogSink {
    /// Must be called from within a tokio runtime
    pub fn new(settings: &Settings) -> Result<Self, TelemetryError> {
        let endpoint = OtlpEndpoint::parse(&settings.telemetry.otlp_endpoint);
        let exporter = build_log_exporter(&endpoint)?;

        let provider = LoggerProvider::builder()
            .with_resource(service_resource(settings))
            .with_batch_exporter(exporter, runtime::Tokio)
            .build();
        let logger = provider.logger(settings.telemetry.service_name.clone());

        Ok(Self {
            provider,
            logger,
            renderer: JsonRenderer,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &OtlpEndpoint {
        &self.endpoint
    }

    pub fn emit(&self, level: Level, record: &EventRecord) {
        let mut log_record = self.logger.create_log_record();
        log_record.set_timestamp(SystemTime::now());
        log_record.set_severity_number(severity(level));
        log_record.set_severity_text(level.as_str());
        log_record.set_body(AnyValue::from(self.renderer.render(record)));
        let cx = Context::current();
        correlate(&mut log_record, cx.span().span_context());
        self.logger.emit(log_record);
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!("Failed to flush OTLP log exporter: {}", e);
        }
    }
}

/// Copies a valid span context onto the exported record
fn correlate(log_record: &mut SdkLogRecord, span_context: &SpanContext) {
    if span_context.is_valid() {
        log_record.set_trace_context(
            span_context.trace_id(),
            span_context.span_id(),
            Some(span_context.trace_flags()),
        );
    }
}

fn severity(level: Level) -> Severity {
    match level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        _ => Severity::Error,
    }
}

/// The complete routing table swapped in by each (re)initialization
pub struct SinkSet {
    pub level: LevelFilter,
    pub pipeline: Pipeline,
    pub console: ConsoleSink,
    pub remote: Option<Arc<OtlpLogSink>>,
}

impl SinkSet {
    /// Routing table in place before the first initialization: drops everything
    pub fn disabled(writer: Arc<BoxMakeWriter>) -> Self {
        Self {
            level: LevelFilter::OFF,
            pipeline: Pipeline::new(Vec::new()),
            console: ConsoleSink::new(RendererKind::Json, writer),
            remote: None,
        }
    }

    pub fn enabled(&self, level: &Level) -> bool {
        *level <= self.level
    }

    /// Runs the shared pipeline once and fans the result out to every sink
    pub fn dispatch(&self, ctx: &EventContext<'_>, record: EventRecord, export: bool) {
        let record = self.pipeline.run(ctx, record);

        self.console.emit(&record);

        if export {
            if let Some(remote) = &self.remote {
                remote.emit(ctx.level, &record);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use opentelemetry::logs::{Logger as _, LoggerProvider as _};
    use opentelemetry::trace::{SpanId, TraceFlags, TraceId, TraceState};

    use super::*;

    /// Shared in-memory writer for asserting on console output
    #[derive(Clone, Default)]
    pub(crate) struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl CapturedOutput {
        pub(crate) fn make_writer(&self) -> Arc<BoxMakeWriter> {
            let captured = self.clone();
            Arc::new(BoxMakeWriter::new(move || captured.clone()))
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_remote_record_carries_valid_span_context() {
        let logger = LoggerProvider::builder().build().logger("sink-tests");
        let span_context = SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );

        let mut correlated = logger.create_log_record();
        correlate(&mut correlated, &span_context);
        let mut uncorrelated = logger.create_log_record();
        correlate(&mut uncorrelated, &SpanContext::empty_context());

        let trace = correlated.trace_context.unwrap();
        assert_eq!(trace.trace_id, span_context.trace_id());
        assert_eq!(trace.span_id, span_context.span_id());
        assert_eq!(trace.trace_flags, Some(TraceFlags::SAMPLED));
        assert!(uncorrelated.trace_context.is_none());
    }

    #[test]
    fn test_renderer_kind_follows_environment() {
        assert_eq!(
            RendererKind::for_environment(Environment::Local),
            RendererKind::Console
        );
        assert_eq!(
            RendererKind::for_environment(Environment::Production),
            RendererKind::Json
        );
    }

    #[test]
    fn test_console_sink_writes_one_line_per_event() {
        let output = CapturedOutput::default();
        let sink = ConsoleSink::new(RendererKind::Json, output.make_writer());

        sink.emit(&EventRecord::with_event("first"));
        sink.emit(&EventRecord::with_event("second"));

        let lines = output.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"event\":\"first\"}");
    }

    #[test]
    fn test_disabled_sink_set_rejects_all_levels() {
        let sinks = SinkSet::disabled(CapturedOutput::default().make_writer());

        assert!(!sinks.enabled(&Level::ERROR));
    }

    #[test]
    fn test_level_threshold() {
        let mut sinks = SinkSet::disabled(CapturedOutput::default().make_writer());
        sinks.level = LevelFilter::WARN;

        assert!(sinks.enabled(&Level::ERROR));
        assert!(sinks.enabled(&Level::WARN));
        assert!(!sinks.enabled(&Level::INFO));
    }
}
