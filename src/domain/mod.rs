//! Domain layer - Core telemetry types, errors and collaborator contracts

pub mod error;
pub mod event;
pub mod exception;
pub mod pool;
pub mod state;

pub use error::TelemetryError;
pub use event::{EventRecord, MESSAGE_KEY, RAW_MESSAGE_KEY};
pub use exception::{UnhandledException, exception_type_name, raise};
pub use pool::{InstrumentedPool, PoolEvent, PoolEventSource, PoolIntrospection, PoolListener};
pub use state::{InitCell, InitTicket, Lifecycle};
