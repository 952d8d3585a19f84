use std::sync::Arc;

use crate::{
    cache::{CacheStore, MemoryCache},
    config::{AppConfig, LockMode},
    db::{DbPool, OrmConn},
    dispatch::{LogSink, OrderEventSink},
    locks::{CartLock, LeaseLock, NoopLock},
    services::anon_cart::AnonCartStore,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub cache: Arc<dyn CacheStore>,
    pub cart_lock: Arc<dyn CartLock>,
    pub anon_cart: AnonCartStore,
    pub events: Arc<dyn OrderEventSink>,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn, config: &AppConfig) -> Self {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let cart_lock: Arc<dyn CartLock> = match config.lock_mode {
            LockMode::Lease => Arc::new(LeaseLock::new(
                Arc::clone(&cache),
                config.lock_lease,
                config.lock_wait,
            )),
            LockMode::Noop => Arc::new(NoopLock),
        };
        let anon_cart = AnonCartStore::new(Arc::clone(&cache), config.cart_ttl);

        Self {
            pool,
            orm,
            cache,
            cart_lock,
            anon_cart,
            events: Arc::new(LogSink),
        }
    }
}
