//! Serve command - runs the instrumented HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::api::create_instrumented_router;
use crate::config::Settings;
use crate::infrastructure::database::MonitoredPgPool;
use crate::infrastructure::logging::{setup_logging, shutdown_logging};
use crate::infrastructure::observability::{
    init_error_reporting, register_pool_metrics, shutdown_tracing,
};

/// Run the server until Ctrl+C or SIGTERM
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    setup_logging(&settings, false)?;

    let _error_reporting = init_error_reporting(&settings)?;

    let pool = match &settings.database {
        Some(database) => Some(Arc::new(MonitoredPgPool::connect_lazy(database)?)),
        None => None,
    };
    let engine = pool.as_ref().and_then(|pool| pool.engine().cloned());

    let app = create_instrumented_router(&settings, engine)?;

    if let Some(pool) = &pool {
        register_pool_metrics(pool);
    }

    let addr = build_socket_addr(&settings)?;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        pool.close().await;
    }

    shutdown_tracing();
    info!("Server shutdown complete");
    shutdown_logging();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

fn build_socket_addr(settings: &Settings) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_addr() {
        let addr = build_socket_addr(&Settings::default()).unwrap();

        assert_eq!(addr.to_string(), "0.0.0.0:8000");
    }

    #[test]
    fn test_invalid_host_rejected() {
        let mut settings = Settings::default();
        settings.server.host = "not-an-ip".to_string();

        assert!(build_socket_addr(&settings).is_err());
    }
}
