use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::error::{AppError, AppResult};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

fn lock_key(phone: &str) -> String {
    format!("lock:cart:phone:{phone}")
}

/// Mutual exclusion for cart read-modify-write sequences, keyed by phone.
///
/// Every add/update/remove on the cached cart must hold this lock for the
/// whole read-modify-write span, otherwise concurrent writers lose updates.
/// Two implementations exist: [`LeaseLock`] over the shared cache, and
/// [`NoopLock`] for single-process deployments where the cache is not shared.
/// Which one runs is a startup configuration choice, not a per-call probe.
#[async_trait]
pub trait CartLock: Send + Sync {
    /// Acquires the lock within the configured wait budget. Timing out is a
    /// retryable failure ([`AppError::LockTimeout`]), distinct from any
    /// cart/stock error.
    async fn acquire(&self, phone: &str) -> AppResult<CartLockGuard>;
}

/// Held lock. Call [`release`](Self::release) when the mutation is done; if
/// the holder dies first, the lease expiry frees the lock.
pub struct CartLockGuard {
    inner: Option<LeaseHandle>,
}

struct LeaseHandle {
    cache: Arc<dyn CacheStore>,
    key: String,
    token: String,
}

impl CartLockGuard {
    fn unlocked() -> Self {
        Self { inner: None }
    }

    pub async fn release(mut self) {
        if let Some(handle) = self.inner.take() {
            handle.cache.delete_if_equals(&handle.key, &handle.token).await;
        }
    }
}

/// Lease-based lock on the shared cache: set-if-absent with a unique token
/// and a short TTL, released only by the token holder.
pub struct LeaseLock {
    cache: Arc<dyn CacheStore>,
    lease: Duration,
    wait: Duration,
}

impl LeaseLock {
    pub fn new(cache: Arc<dyn CacheStore>, lease: Duration, wait: Duration) -> Self {
        Self { cache, lease, wait }
    }
}

#[async_trait]
impl CartLock for LeaseLock {
    async fn acquire(&self, phone: &str) -> AppResult<CartLockGuard> {
        let key = lock_key(phone);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;

        loop {
            if self
                .cache
                .set_if_absent(&key, token.clone(), self.lease)
                .await
            {
                return Ok(CartLockGuard {
                    inner: Some(LeaseHandle {
                        cache: Arc::clone(&self.cache),
                        key,
                        token,
                    }),
                });
            }
            if Instant::now() >= deadline {
                tracing::debug!(%key, "cart lock wait exhausted");
                return Err(AppError::LockTimeout);
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }
}

/// Grants immediately without any coordination. Correct only when a single
/// process owns the cache; unsafe under multi-process concurrency.
pub struct NoopLock;

#[async_trait]
impl CartLock for NoopLock {
    async fn acquire(&self, _phone: &str) -> AppResult<CartLockGuard> {
        Ok(CartLockGuard::unlocked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn lease_lock(lease_ms: u64, wait_ms: u64) -> (Arc<MemoryCache>, LeaseLock) {
        let cache = Arc::new(MemoryCache::new());
        let lock = LeaseLock::new(
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Duration::from_millis(lease_ms),
            Duration::from_millis(wait_ms),
        );
        (cache, lock)
    }

    #[tokio::test]
    async fn acquire_release_acquire() {
        let (_, lock) = lease_lock(5000, 100);
        let guard = lock.acquire("9876543210").await.unwrap();
        guard.release().await;
        let guard = lock.acquire("9876543210").await.unwrap();
        guard.release().await;
    }

    #[tokio::test]
    async fn contended_acquire_times_out() {
        let (_, lock) = lease_lock(5000, 120);
        let guard = lock.acquire("9876543210").await.unwrap();
        let second = lock.acquire("9876543210").await;
        assert!(matches!(second, Err(AppError::LockTimeout)));
        guard.release().await;
    }

    #[tokio::test]
    async fn different_phones_do_not_contend() {
        let (_, lock) = lease_lock(5000, 100);
        let a = lock.acquire("1111111111").await.unwrap();
        let b = lock.acquire("2222222222").await.unwrap();
        a.release().await;
        b.release().await;
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let (_, lock) = lease_lock(30, 500);
        let _abandoned = lock.acquire("9876543210").await.unwrap();
        // Holder "dies" without releasing; the lease frees the lock.
        let guard = lock.acquire("9876543210").await.unwrap();
        guard.release().await;
    }

    #[tokio::test]
    async fn serialized_read_modify_write_loses_no_updates() {
        let (cache, lock) = lease_lock(5000, 2000);
        let lock = Arc::new(lock);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = Arc::clone(&cache);
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move {
                let guard = lock.acquire("9876543210").await.unwrap();
                let current: i64 = cache
                    .get("counter")
                    .await
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                cache.set("counter", (current + 1).to_string(), None).await;
                guard.release().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.get("counter").await.as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn noop_lock_always_grants() {
        let lock = NoopLock;
        let a = lock.acquire("9876543210").await.unwrap();
        let b = lock.acquire("9876543210").await.unwrap();
        a.release().await;
        b.release().await;
    }
}
