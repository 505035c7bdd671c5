//! Database connection pooling with lifecycle events for the pool gauge

mod postgres;

pub use postgres::MonitoredPgPool;
