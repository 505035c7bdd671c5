//! CLI module for telemetry-core
//!
//! Provides the `serve` subcommand, which boots logging, tracing and metrics
//! around a minimal axum application.

pub mod serve;

use clap::{Parser, Subcommand};

/// Observability correlation layer for axum services
#[derive(Parser)]
#[command(name = "telemetry-core")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the instrumented HTTP server
    Serve,
}
