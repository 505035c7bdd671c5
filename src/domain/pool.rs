//! Capability interface of a pooled resource observed by the gauge sampler

use std::sync::Arc;

/// Lifecycle events emitted by a connection pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
    Checkout,
    Checkin,
    Connect,
    Close,
    Invalidate,
}

impl PoolEvent {
    pub const ALL: [PoolEvent; 5] = [
        PoolEvent::Checkout,
        PoolEvent::Checkin,
        PoolEvent::Connect,
        PoolEvent::Close,
        PoolEvent::Invalidate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolEvent::Checkout => "checkout",
            PoolEvent::Checkin => "checkin",
            PoolEvent::Connect => "connect",
            PoolEvent::Close => "close",
            PoolEvent::Invalidate => "invalidate",
        }
    }
}

/// Optional introspection surface of a pool.
///
/// Backends expose different subsets; `None` means the capability is not
/// supported, not that the value is zero.
pub trait PoolIntrospection: Send + Sync {
    /// Connections currently handed out to callers
    fn checked_out(&self) -> Option<usize> {
        None
    }

    /// Connections currently idle inside the pool
    fn checked_in(&self) -> Option<usize> {
        None
    }

    /// Total number of connections held by the pool
    fn size(&self) -> Option<usize> {
        None
    }
}

/// Callback invoked from pool lifecycle hooks
pub type PoolListener = Arc<dyn Fn(PoolEvent) + Send + Sync>;

/// Registration point for pool lifecycle listeners
pub trait PoolEventSource: Send + Sync {
    fn listen(&self, event: PoolEvent, listener: PoolListener);
}

/// A pool that can be both observed and subscribed to
pub trait InstrumentedPool: PoolIntrospection + PoolEventSource {}

impl<T: PoolIntrospection + PoolEventSource> InstrumentedPool for T {}

impl<DB: sqlx::Database> PoolIntrospection for sqlx::Pool<DB> {
    fn checked_out(&self) -> Option<usize> {
        Some((self.size() as usize).saturating_sub(self.num_idle()))
    }

    fn checked_in(&self) -> Option<usize> {
        Some(self.num_idle())
    }

    fn size(&self) -> Option<usize> {
        Some(sqlx::Pool::size(self) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SizeOnly;

    impl PoolIntrospection for SizeOnly {
        fn size(&self) -> Option<usize> {
            Some(4)
        }
    }

    #[test]
    fn test_event_names() {
        let names: Vec<&str> = PoolEvent::ALL.iter().map(PoolEvent::as_str).collect();
        assert_eq!(names, vec!["checkout", "checkin", "connect", "close", "invalidate"]);
    }

    #[test]
    fn test_introspection_defaults_to_unsupported() {
        let pool = SizeOnly;

        assert_eq!(pool.checked_out(), None);
        assert_eq!(pool.checked_in(), None);
        assert_eq!(pool.size(), Some(4));
    }
}
