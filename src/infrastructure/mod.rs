//! Infrastructure layer - Logging, observability and database adapters

pub mod database;
pub mod logging;
pub mod observability;
