//! Ordered enrichment stages shared by every sink
//!
//! The standard pipeline runs, in order:
//!
//! 1. `add_log_level`, `add_logger_name`
//! 2. `add_callsite`
//! 3. `render_stack_info`, `format_exc_info`
//! 4. `add_timestamp`
//! 5. `add_service_context`
//! 6. `add_trace_context`
//! 7. `drop_color_message`
//! 8. `normalize_message_key`
//!
//! Every stage is total: a value that cannot be computed is left out of the
//! record instead of failing the event.

use std::backtrace::Backtrace;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::Level;

use super::correlation::{AddTraceContext, SpanContextSource};
use crate::domain::{EventRecord, MESSAGE_KEY, RAW_MESSAGE_KEY};

/// Field set by callers that want the current stack attached
pub const STACK_INFO_KEY: &str = "stack_info";

/// Field carrying captured error chains until they are formatted
pub const EXC_INFO_KEY: &str = "exc_info";

/// Location of the statement that emitted the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Callsite<'a> {
    pub file: &'a str,
    pub function: &'a str,
    pub line: u32,
}

/// Immutable per-event inputs visible to every processor
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub logger_name: &'a str,
    pub level: Level,
    pub callsite: Option<Callsite<'a>>,
}

impl<'a> EventContext<'a> {
    pub fn new(logger_name: &'a str, level: Level) -> Self {
        Self {
            logger_name,
            level,
            callsite: None,
        }
    }

    pub fn with_callsite(mut self, callsite: Callsite<'a>) -> Self {
        self.callsite = Some(callsite);
        self
    }
}

/// One enrichment stage
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, ctx: &EventContext<'_>, record: EventRecord) -> EventRecord;
}

/// Lower-case level name used in rendered records
pub fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warning",
        _ => "error",
    }
}

pub struct AddLogLevel;

impl Processor for AddLogLevel {
    fn name(&self) -> &'static str {
        "add_log_level"
    }

    fn process(&self, ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        record.insert("level", level_name(ctx.level));
        record
    }
}

pub struct AddLoggerName;

impl Processor for AddLoggerName {
    fn name(&self) -> &'static str {
        "add_logger_name"
    }

    fn process(&self, ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        record.insert("logger", ctx.logger_name);
        record
    }
}

pub struct AddCallsite;

impl Processor for AddCallsite {
    fn name(&self) -> &'static str {
        "add_callsite"
    }

    fn process(&self, ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        let Some(callsite) = ctx.callsite else {
            return record;
        };

        let filename = callsite
            .file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(callsite.file);

        record.insert("filename", filename);
        record.insert("func_name", callsite.function);
        record.insert("lineno", callsite.line);
        record
    }
}

/// Replaces a truthy `stack_info` flag with the rendered current stack
pub struct RenderStackInfo;

impl Processor for RenderStackInfo {
    fn name(&self) -> &'static str {
        "render_stack_info"
    }

    fn process(&self, _ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        match record.remove(STACK_INFO_KEY) {
            Some(Value::Bool(true)) => {
                record.insert("stack", Backtrace::force_capture().to_string());
            }
            Some(Value::String(stack)) if !stack.is_empty() => {
                record.insert("stack", stack);
            }
            _ => {}
        }
        record
    }
}

/// Turns captured error chains into a single `exception` text field
pub struct FormatExcInfo;

impl Processor for FormatExcInfo {
    fn name(&self) -> &'static str {
        "format_exc_info"
    }

    fn process(&self, _ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        let text = match record.remove(EXC_INFO_KEY) {
            Some(Value::Array(chain)) => chain
                .iter()
                .map(|cause| match cause {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\nCaused by: "),
            Some(Value::String(s)) => s,
            Some(Value::Null) | Some(Value::Bool(false)) | None => return record,
            Some(other) => other.to_string(),
        };

        if !text.is_empty() {
            record.set_default("exception", text);
        }
        record
    }
}

pub struct AddTimestamp;

impl Processor for AddTimestamp {
    fn name(&self) -> &'static str {
        "add_timestamp"
    }

    fn process(&self, _ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        record.insert(
            "timestamp",
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        record
    }
}

/// Service identity stamped on every record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service: String,
    pub environment: String,
}

pub struct AddServiceContext {
    identity: ServiceIdentity,
}

impl AddServiceContext {
    pub fn new(identity: ServiceIdentity) -> Self {
        Self { identity }
    }
}

impl Processor for AddServiceContext {
    fn name(&self) -> &'static str {
        "add_service_context"
    }

    fn process(&self, _ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        record.set_default("service", self.identity.service.as_str());
        record.set_default("environment", self.identity.environment.as_str());
        record
    }
}

/// Drops colorized duplicates that only make sense on a terminal
pub struct DropColorMessage;

impl Processor for DropColorMessage {
    fn name(&self) -> &'static str {
        "drop_color_message"
    }

    fn process(&self, _ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        record.remove("color_message");
        record
    }
}

pub struct NormalizeMessageKey;

impl Processor for NormalizeMessageKey {
    fn name(&self) -> &'static str {
        "normalize_message_key"
    }

    fn process(&self, _ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        record.rename(RAW_MESSAGE_KEY, MESSAGE_KEY);
        record
    }
}

/// Fixed-order chain of processors
pub struct Pipeline {
    processors: Vec<Box<dyn Processor>>,
}

impl Pipeline {
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// The shared chain used by every sink
    pub fn standard(identity: ServiceIdentity, spans: Arc<dyn SpanContextSource>) -> Self {
        Self::new(vec![
            Box::new(AddLogLevel),
            Box::new(AddLoggerName),
            Box::new(AddCallsite),
            Box::new(RenderStackInfo),
            Box::new(FormatExcInfo),
            Box::new(AddTimestamp),
            Box::new(AddServiceContext::new(identity)),
            Box::new(AddTraceContext::new(spans)),
            Box::new(DropColorMessage),
            Box::new(NormalizeMessageKey),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, ctx: &EventContext<'_>, record: EventRecord) -> EventRecord {
        self.processors
            .iter()
            .fold(record, |record, processor| processor.process(ctx, record))
    }
}
