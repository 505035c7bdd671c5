//! API middleware components

pub mod metrics;
pub mod server_span;

pub use metrics::{ExcludedPaths, capture_unhandled_exceptions, track_http_requests};
pub use server_span::http_server_span;
