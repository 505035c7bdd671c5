//! PostgreSQL connection pool reporting checkout, checkin and connect events

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::domain::{PoolEvent, PoolEventSource, PoolIntrospection, PoolListener, TelemetryError};
use crate::infrastructure::observability::{DatabaseEngine, PoolEventHub};

/// `PgPool` whose lifecycle hooks feed a [`PoolEventHub`]
pub struct MonitoredPgPool {
    pool: PgPool,
    hub: Arc<PoolEventHub>,
    engine: Option<DatabaseEngine>,
}

impl MonitoredPgPool {
    /// Builds the pool without opening connections; the first query connects
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, TelemetryError> {
        let hub = Arc::new(PoolEventHub::new());

        let on_connect = hub.clone();
        let on_acquire = hub.clone();
        let on_release = hub.clone();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .after_connect(move |_conn, _meta| {
                on_connect.emit(PoolEvent::Connect);
                Box::pin(async { Ok(()) })
            })
            .before_acquire(move |_conn, _meta| {
                on_acquire.emit(PoolEvent::Checkout);
                Box::pin(async { Ok(true) })
            })
            .after_release(move |_conn, _meta| {
                on_release.emit(PoolEvent::Checkin);
                Box::pin(async { Ok(true) })
            })
            .connect_lazy(&config.url)
            .map_err(|e| {
                TelemetryError::configuration(format!("Invalid database URL: {}", e))
            })?;

        Ok(Self {
            pool,
            hub,
            engine: DatabaseEngine::from_url(&config.url),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn engine(&self) -> Option<&DatabaseEngine> {
        self.engine.as_ref()
    }

    /// Closes every connection and reports the pool as closed
    pub async fn close(&self) {
        self.pool.close().await;
        self.hub.emit(PoolEvent::Close);
    }
}

impl PoolIntrospection for MonitoredPgPool {
    fn checked_out(&self) -> Option<usize> {
        PoolIntrospection::checked_out(&self.pool)
    }

    fn checked_in(&self) -> Option<usize> {
        PoolIntrospection::checked_in(&self.pool)
    }

    fn size(&self) -> Option<usize> {
        PoolIntrospection::size(&self.pool)
    }
}

impl PoolEventSource for MonitoredPgPool {
    fn listen(&self, event: PoolEvent, listener: PoolListener) {
        self.hub.listen(event, listener);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            max_connections: 5,
            min_connections: 0,
            acquire_timeout_secs: 1,
            idle_timeout_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_lazy_pool_starts_empty() {
        let pool = MonitoredPgPool::connect_lazy(&config("postgresql://app@localhost:5432/orders"))
            .unwrap();

        assert_eq!(pool.checked_out(), Some(0));
        assert_eq!(pool.checked_in(), Some(0));
        assert_eq!(pool.size(), Some(0));
        assert_eq!(pool.engine().map(DatabaseEngine::name), Some("orders"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let result = MonitoredPgPool::connect_lazy(&config("not-a-database-url"));

        assert!(matches!(result, Err(TelemetryError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_close_notifies_listeners() {
        let pool = MonitoredPgPool::connect_lazy(&config("postgresql://app@localhost:5432/orders"))
            .unwrap();
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        pool.listen(
            PoolEvent::Close,
            Arc::new(move |_: PoolEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        pool.close().await;

        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
