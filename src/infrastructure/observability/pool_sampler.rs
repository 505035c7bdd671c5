//! Connection pool gauge driven by pool lifecycle events

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use metrics::gauge;

use super::metrics::DB_CONNECTION_POOL_SIZE;
use crate::domain::{
    InitCell, InstrumentedPool, PoolEvent, PoolEventSource, PoolIntrospection, PoolListener,
};

/// Values written to `db_connection_pool_size`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolGaugeValues {
    pub active: f64,
    pub idle: f64,
}

/// Reads the pool through whatever introspection it supports.
///
/// `active` is the checked-out count, or 0. `idle` is the checked-in count
/// when exposed, else the total size minus `active` floored at 0, else 0.
pub fn pool_gauge_values<P: PoolIntrospection + ?Sized>(pool: &P) -> PoolGaugeValues {
    let active = pool.checked_out().unwrap_or(0);
    let idle = match (pool.checked_in(), pool.size()) {
        (Some(checked_in), _) => checked_in,
        (None, Some(size)) => size.saturating_sub(active),
        (None, None) => 0,
    };

    PoolGaugeValues {
        active: active as f64,
        idle: idle as f64,
    }
}

/// Recomputes and writes both pool gauge series
pub fn refresh<P: PoolIntrospection + ?Sized>(pool: &P) {
    let values = pool_gauge_values(pool);

    gauge!(DB_CONNECTION_POOL_SIZE, "state" => "active").set(values.active);
    gauge!(DB_CONNECTION_POOL_SIZE, "state" => "idle").set(values.idle);
}

/// Binds gauge refreshes to a pool's lifecycle events, once
pub struct PoolGaugeSampler {
    registered: InitCell,
}

impl PoolGaugeSampler {
    pub const fn new() -> Self {
        Self {
            registered: InitCell::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.is_ready()
    }

    /// Subscribes to every [`PoolEvent`] and refreshes immediately.
    ///
    /// Returns false when a pool was already registered. Listeners hold the
    /// pool weakly, so registering does not keep it alive.
    pub fn register<P: InstrumentedPool + 'static>(&self, pool: &Arc<P>) -> bool {
        let Some(ticket) = self.registered.begin(false) else {
            return false;
        };

        for event in PoolEvent::ALL {
            let weak = Arc::downgrade(pool);
            pool.listen(
                event,
                Arc::new(move |_: PoolEvent| {
                    if let Some(pool) = weak.upgrade() {
                        refresh(pool.as_ref());
                    }
                }),
            );
        }

        refresh(pool.as_ref());
        ticket.complete();

        tracing::debug!("Pool gauge listeners registered");
        true
    }
}

impl Default for PoolGaugeSampler {
    fn default() -> Self {
        Self::new()
    }
}

static POOL_SAMPLER: PoolGaugeSampler = PoolGaugeSampler::new();

/// Process-wide pool gauge registration
pub fn register_pool_metrics<P: InstrumentedPool + 'static>(pool: &Arc<P>) -> bool {
    POOL_SAMPLER.register(pool)
}

/// Listener registry a pool adapter embeds to implement [`PoolEventSource`]
#[derive(Default)]
pub struct PoolEventHub {
    listeners: RwLock<HashMap<PoolEvent, Vec<PoolListener>>>,
}

impl PoolEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes every listener bound to `event`, outside the registry lock
    pub fn emit(&self, event: PoolEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .cloned()
            .unwrap_or_default();

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self, event: PoolEvent) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .map_or(0, Vec::len)
    }
}

impl PoolEventSource for PoolEventHub {
    fn listen(&self, event: PoolEvent, listener: PoolListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(listener);
    }
}
