//! Structured logging - event pipeline, renderers and sinks

mod bootstrap;
mod correlation;
mod layer;
pub mod processors;
mod render;
mod sinks;

pub use bootstrap::{
    CallSiteInstrumentor, GlobalSubscriber, LoggingBootstrap, install_span_export, setup_logging,
    shutdown_logging,
};
pub use correlation::{AddTraceContext, CurrentOtelContext, SpanContextSource};
pub use layer::EventPipelineLayer;
pub use processors::{Callsite, EventContext, Pipeline, Processor, ServiceIdentity};
pub use render::{ConsoleRenderer, JsonRenderer, Renderer};
pub use sinks::{ConsoleSink, OtlpLogSink, RendererKind, SinkSet};
