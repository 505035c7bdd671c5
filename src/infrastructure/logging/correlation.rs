//! Bridge between the active OpenTelemetry span and log records

use std::sync::Arc;

use opentelemetry::Context;
use opentelemetry::trace::{SpanContext, TraceContextExt};

use super::processors::{EventContext, Processor};
use crate::domain::EventRecord;

/// Supplies the span context active for the current request or task
pub trait SpanContextSource: Send + Sync {
    fn current(&self) -> SpanContext;
}

/// Reads OpenTelemetry's task-scoped context.
///
/// Works against whatever tracer provider is globally installed; with none
/// installed the context is simply invalid.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentOtelContext;

impl SpanContextSource for CurrentOtelContext {
    fn current(&self) -> SpanContext {
        Context::current().span().span_context().clone()
    }
}

/// Adds `trace_id`, `span_id` and `trace_flags` when a valid span is active
pub struct AddTraceContext {
    source: Arc<dyn SpanContextSource>,
}

impl AddTraceContext {
    pub fn new(source: Arc<dyn SpanContextSource>) -> Self {
        Self { source }
    }
}

impl Processor for AddTraceContext {
    fn name(&self) -> &'static str {
        "add_trace_context"
    }

    fn process(&self, _ctx: &EventContext<'_>, mut record: EventRecord) -> EventRecord {
        let span_context = self.source.current();
        if !span_context.is_valid() {
            return record;
        }

        record.set_default("trace_id", span_context.trace_id().to_string());
        record.set_default("span_id", span_context.span_id().to_string());
        record.set_default(
            "trace_flags",
            format!("{:02x}", span_context.trace_flags().to_u8()),
        );
        record
    }
}
