//! Handler failures escaping request handling

use std::any::Any;
use std::error::Error;

/// Panic payload naming the concrete error type that aborted a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledException {
    type_name: &'static str,
    message: String,
}

impl UnhandledException {
    pub fn new<E: Error>(err: &E) -> Self {
        Self {
            type_name: short_type_name::<E>(),
            message: err.to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Aborts the current handler with `err`, preserving its type name for
/// exception metrics
pub fn raise<E: Error>(err: E) -> ! {
    std::panic::panic_any(UnhandledException::new(&err))
}

/// Exception type label for a caught panic payload
pub fn exception_type_name(payload: &(dyn Any + Send)) -> &'static str {
    if let Some(exception) = payload.downcast_ref::<UnhandledException>() {
        exception.type_name()
    } else if payload.is::<&'static str>() || payload.is::<String>() {
        "panic"
    } else {
        "unknown"
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
