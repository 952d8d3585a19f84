use std::future::ready;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

/// Key-value store backing the anonymous carts, the cart write lock and the
/// catalog generation counter.
///
/// The cache is best-effort by contract: implementations must degrade to
/// "miss" instead of failing, so a broken cache renders as an empty cart
/// rather than a 500. All per-key operations are atomic with respect to
/// concurrent callers of the same key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    /// Writes `value`, replacing any previous entry. `None` means no expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>);

    /// Idempotent delete.
    async fn delete(&self, key: &str);

    /// Atomically increments an integer counter, seeding it with `seed` when
    /// the key is missing or holds a non-integer. Returns the stored value.
    async fn increment(&self, key: &str, seed: i64) -> i64;

    /// Lease primitive: stores `value` only when the key is absent (or its
    /// previous lease expired). Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> bool;

    /// Deletes the key only when the current value equals `expected`, so a lease
    /// holder cannot release a lock it already lost. Returns whether the
    /// entry was removed.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> bool;
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process `CacheStore` on `moka`. Per-entry TTLs are enforced by the
/// store itself (expired entries read as absent), which lets short lock
/// leases and day-long cart entries share one cache.
pub struct MemoryCache {
    inner: Cache<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().max_capacity(100_000).build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entry = self.inner.get(key).await?;
        if entry.is_expired() {
            self.inner.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.inner.insert(key.to_string(), entry).await;
    }

    async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    async fn increment(&self, key: &str, seed: i64) -> i64 {
        let result = self
            .inner
            .entry(key.to_string())
            .and_compute_with(|current| {
                let next = match &current {
                    Some(entry) if !entry.value().is_expired() => entry
                        .value()
                        .value
                        .parse::<i64>()
                        .map(|v| v + 1)
                        .unwrap_or(seed),
                    _ => seed,
                };
                ready(Op::Put(CacheEntry {
                    value: next.to_string(),
                    expires_at: None,
                }))
            })
            .await;

        match result {
            CompResult::Inserted(entry)
            | CompResult::ReplacedWith(entry)
            | CompResult::Unchanged(entry) => entry.value().value.parse().unwrap_or(seed),
            _ => seed,
        }
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> bool {
        let entry = CacheEntry {
            value,
            expires_at: Some(Instant::now() + ttl),
        };
        let result = self
            .inner
            .entry(key.to_string())
            .and_compute_with(|current| {
                let op = match &current {
                    Some(existing) if !existing.value().is_expired() => Op::Nop,
                    _ => Op::Put(entry),
                };
                ready(op)
            })
            .await;

        matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> bool {
        let result = self
            .inner
            .entry(key.to_string())
            .and_compute_with(|current| {
                let op = match &current {
                    Some(entry)
                        if !entry.value().is_expired() && entry.value().value == expected =>
                    {
                        Op::Remove
                    }
                    _ => Op::Nop,
                };
                ready(op)
            })
            .await;

        matches!(result, CompResult::Removed(_))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), None).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".into(), Some(Duration::from_millis(20)))
            .await;
        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), None).await;
        cache.delete("k").await;
        cache.delete("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn increment_seeds_then_counts() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("n", 100).await, 100);
        assert_eq!(cache.increment("n", 100).await, 101);
        assert_eq!(cache.increment("n", 100).await, 102);
    }

    #[tokio::test]
    async fn concurrent_increments_do_not_lose_updates() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("n", "0".into(), None).await;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.increment("n", 0).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.get("n").await.as_deref(), Some("50"));
    }

    #[tokio::test]
    async fn set_if_absent_grants_once_until_expiry() {
        let cache = MemoryCache::new();
        assert!(
            cache
                .set_if_absent("lease", "a".into(), Duration::from_millis(30))
                .await
        );
        assert!(
            !cache
                .set_if_absent("lease", "b".into(), Duration::from_millis(30))
                .await
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(
            cache
                .set_if_absent("lease", "b".into(), Duration::from_millis(30))
                .await
        );
    }

    #[tokio::test]
    async fn delete_if_equals_only_removes_matching_value() {
        let cache = MemoryCache::new();
        cache.set("lease", "token-a".into(), None).await;
        assert!(!cache.delete_if_equals("lease", "token-b").await);
        assert!(cache.delete_if_equals("lease", "token-a").await);
        assert!(!cache.delete_if_equals("lease", "token-a").await);
    }
}
