//! `tracing` layer feeding events into the sink set

use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use super::processors::{Callsite, EXC_INFO_KEY, EventContext};
use super::sinks::SinkSet;
use crate::domain::{EventRecord, RAW_MESSAGE_KEY};

/// Targets whose events are never exported, so exporting cannot feed itself
const EXPORTER_TARGETS: [&str; 5] = ["opentelemetry", "tonic", "h2", "hyper", "tower::"];

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Fields bound to a span, merged into every event emitted inside it
#[derive(Debug, Default)]
struct SpanFields(Map<String, Value>);

/// Converts `tracing` events into [`EventRecord`]s and hands them to the
/// currently installed [`SinkSet`]
#[derive(Clone)]
pub struct EventPipelineLayer {
    sinks: Arc<ArcSwap<SinkSet>>,
}

impl EventPipelineLayer {
    pub fn new(sinks: Arc<ArcSwap<SinkSet>>) -> Self {
        Self { sinks }
    }
}

impl<S> Layer<S> for EventPipelineLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(fields) => fields.0.extend(visitor.fields),
            None => extensions.insert(SpanFields(visitor.fields)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let sinks = self.sinks.load();
        let metadata = event.metadata();
        if !sinks.enabled(metadata.level()) {
            return;
        }

        // a sink that logs while emitting must not recurse into itself
        let Some(_guard) = DispatchGuard::enter() else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = EventRecord::from(visitor.fields);

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    for (key, value) in &fields.0 {
                        record.set_default(key, value.clone());
                    }
                }
            }
        }

        let target = visitor.log_target.as_deref().unwrap_or(metadata.target());
        let file = visitor.log_file.as_deref().or(metadata.file());
        let function = visitor
            .log_module_path
            .as_deref()
            .or(metadata.module_path())
            .unwrap_or(target);
        let line = visitor.log_line.or(metadata.line());

        let mut event_ctx = EventContext::new(target, *metadata.level());
        if let (Some(file), Some(line)) = (file, line) {
            event_ctx = event_ctx.with_callsite(Callsite {
                file,
                function,
                line,
            });
        }

        let export = !EXPORTER_TARGETS
            .iter()
            .any(|prefix| target.starts_with(prefix));

        sinks.dispatch(&event_ctx, record, export);
    }
}

struct DispatchGuard;

impl DispatchGuard {
    fn enter() -> Option<Self> {
        if DISPATCHING.with(|flag| flag.replace(true)) {
            return None;
        }
        Some(DispatchGuard)
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|flag| flag.set(false));
    }
}

/// Collects event fields; `message` becomes the raw event text and the
/// `log.*` metadata of bridged `log` records is kept apart
#[derive(Default)]
struct FieldVisitor {
    fields: Map<String, Value>,
    log_target: Option<String>,
    log_module_path: Option<String>,
    log_file: Option<String>,
    log_line: Option<u32>,
}

impl FieldVisitor {
    fn key(field: &Field) -> String {
        match field.name() {
            "message" => RAW_MESSAGE_KEY.to_string(),
            name => name.to_string(),
        }
    }

    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(Self::key(field), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "log.target" => self.log_target = Some(value.to_string()),
            "log.module_path" => self.log_module_path = Some(value.to_string()),
            "log.file" => self.log_file = Some(value.to_string()),
            _ => self.insert(field, Value::from(value)),
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "log.line" => self.log_line = u32::try_from(value).ok(),
            _ => self.insert(field, Value::from(value)),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        let mut chain = vec![Value::from(value.to_string())];
        let mut source = value.source();
        while let Some(cause) = source {
            chain.push(Value::from(cause.to_string()));
            source = cause.source();
        }

        self.insert(field, Value::from(value.to_string()));
        self.fields.insert(EXC_INFO_KEY.to_string(), Value::Array(chain));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name().starts_with("log.") {
            return;
        }
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}
