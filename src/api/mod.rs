//! API layer - HTTP endpoints and middleware

pub mod health;
pub mod middleware;
pub mod router;

pub use router::{create_instrumented_router, create_router};
