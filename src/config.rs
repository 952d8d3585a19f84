use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Lease-based lock on the shared cache (default).
    Lease,
    /// No locking; only safe when a single process owns the cache.
    Noop,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// TTL for anonymous cart entries.
    pub cart_ttl: Duration,
    pub lock_mode: LockMode,
    /// How long an acquired cart lock is held before the lease expires.
    pub lock_lease: Duration,
    /// How long a writer waits for a contended cart lock before giving up.
    pub lock_wait: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let cart_ttl = env::var("CART_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60 * 60 * 24));
        let lock_mode = match env::var("CART_LOCK_MODE").as_deref() {
            Ok("none") => LockMode::Noop,
            _ => LockMode::Lease,
        };
        let lock_lease = env::var("CART_LOCK_LEASE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(5));
        let lock_wait = env::var("CART_LOCK_WAIT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(2));

        Ok(Self {
            database_url,
            host,
            port,
            cart_ttl,
            lock_mode,
            lock_lease,
            lock_wait,
        })
    }
}
