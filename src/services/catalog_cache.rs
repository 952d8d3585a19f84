use chrono::Utc;

use crate::cache::CacheStore;

const CATALOG_VERSION_KEY: &str = "products:catalog:version";

fn seed_version() -> i64 {
    Utc::now().timestamp()
}

/// Current catalog generation. Seeded from the clock on first use (or after
/// counter loss) so a restarted cache never resurrects keys from an older
/// generation.
pub async fn catalog_version(cache: &dyn CacheStore) -> i64 {
    match cache
        .get(CATALOG_VERSION_KEY)
        .await
        .and_then(|v| v.parse::<i64>().ok())
    {
        Some(version) => version,
        None => {
            let version = seed_version();
            cache.set(CATALOG_VERSION_KEY, version.to_string(), None).await;
            version
        }
    }
}

/// Builds a catalog cache key namespaced by the current generation, e.g.
/// `products:catalog:v1724800000:section:bakery`.
pub async fn catalog_cache_key(cache: &dyn CacheStore, namespace: &str, parts: &[&str]) -> String {
    let version = catalog_version(cache).await;
    let mut key = format!("products:{namespace}:v{version}");
    let suffix = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(":");
    if !suffix.is_empty() {
        key.push(':');
        key.push_str(&suffix);
    }
    key
}

/// One atomic increment invalidates every catalog read key at once; no
/// pattern-delete, no race against concurrent cache population.
pub async fn invalidate_catalog_cache(cache: &dyn CacheStore) {
    cache.increment(CATALOG_VERSION_KEY, seed_version()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn version_is_stable_until_invalidated() {
        let cache = MemoryCache::new();
        let v1 = catalog_version(&cache).await;
        let v2 = catalog_version(&cache).await;
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn invalidate_bumps_the_version() {
        let cache = MemoryCache::new();
        let before = catalog_version(&cache).await;
        invalidate_catalog_cache(&cache).await;
        let after = catalog_version(&cache).await;
        assert_eq!(after, before + 1);
    }

    #[tokio::test]
    async fn keys_carry_namespace_version_and_parts() {
        let cache = MemoryCache::new();
        let version = catalog_version(&cache).await;
        let key = catalog_cache_key(&cache, "catalog", &["section", " bakery ", ""]).await;
        assert_eq!(key, format!("products:catalog:v{version}:section:bakery"));

        let bare = catalog_cache_key(&cache, "catalog", &[]).await;
        assert_eq!(bare, format!("products:catalog:v{version}"));
    }

    #[tokio::test]
    async fn old_generation_keys_are_never_reused() {
        let cache = MemoryCache::new();
        let key_before = catalog_cache_key(&cache, "catalog", &["home"]).await;
        invalidate_catalog_cache(&cache).await;
        let key_after = catalog_cache_key(&cache, "catalog", &["home"]).await;
        assert_ne!(key_before, key_after);
    }
}
