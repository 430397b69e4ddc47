//! Read-through TTL cache for collaborator responses

use cached::{Cached, TimedCache};
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache key for a collaborator request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: String,
    /// Operation, e.g. "candles" or "snapshot"
    pub endpoint: String,
    /// Remaining parameters as a JSON string
    pub params: String,
}

impl CacheKey {
    pub fn new(symbol: impl Into<String>, endpoint: impl Into<String>, params: impl Serialize) -> Self {
        Self {
            symbol: symbol.into(),
            endpoint: endpoint.into(),
            params: serde_json::to_string(&params).unwrap_or_default(),
        }
    }
}

/// Shared TTL cache of JSON values.
///
/// Clones share storage. Entries expire `ttl` after insertion.
pub struct DataCache {
    cache: Arc<RwLock<TimedCache<CacheKey, serde_json::Value>>>,
}

impl DataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        // TimedCache evicts on read, so even lookups need the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: CacheKey, value: serde_json::Value) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Return the cached value or run `fetcher` and cache its success.
    ///
    /// Errors are passed through and never cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: CacheKey,
        fetcher: F,
    ) -> Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value, E>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!(symbol = %key.symbol, endpoint = %key.endpoint, "Cache hit");
            return Ok(value);
        }

        tracing::debug!(symbol = %key.symbol, endpoint = %key.endpoint, "Cache miss");
        let value = fetcher().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(key);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Clone for DataCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_cache_key_creation() {
        let key = CacheKey::new("INFY", "candles", json!({ "interval": "1d", "days": 60 }));
        assert_eq!(key.symbol, "INFY");
        assert_eq!(key.endpoint, "candles");
        assert!(key.params.contains("interval"));
    }

    #[tokio::test]
    async fn test_get_or_fetch_caches_success() {
        let cache = DataCache::new(Duration::from_secs(60));
        let key = CacheKey::new("INFY", "snapshot", json!({}));
        let value = json!({ "price": 1500.0 });

        let mut call_count = 0;
        let result = cache
            .get_or_fetch(key.clone(), || {
                call_count += 1;
                async { Ok::<_, String>(value.clone()) }
            })
            .await
            .unwrap();
        assert_eq!(result, value);

        let result = cache
            .get_or_fetch(key.clone(), || {
                call_count += 1;
                async { Ok::<_, String>(json!(null)) }
            })
            .await
            .unwrap();
        assert_eq!(result, value);
        assert_eq!(call_count, 1);
    }

    #[tokio::test]
    async fn test_errors_not_cached() {
        let cache = DataCache::new(Duration::from_secs(60));
        let key = CacheKey::new("INFY", "snapshot", json!({}));

        let first = cache
            .get_or_fetch(key.clone(), || async { Err::<serde_json::Value, _>("down") })
            .await;
        assert!(first.is_err());
        assert!(cache.is_empty().await);

        let second = cache
            .get_or_fetch(key, || async { Ok::<_, &str>(json!(1)) })
            .await;
        assert_eq!(second, Ok(json!(1)));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = DataCache::new(Duration::from_secs(60));
        for i in 0..3 {
            let key = CacheKey::new(format!("SYM{i}"), "candles", json!({}));
            cache.insert(key, json!(i)).await;
        }
        assert_eq!(cache.len().await, 3);

        cache.invalidate(&CacheKey::new("SYM0", "candles", json!({}))).await;
        assert_eq!(cache.len().await, 2);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = DataCache::new(Duration::from_secs(1));
        let key = CacheKey::new("INFY", "snapshot", json!({}));
        cache.insert(key.clone(), json!(1)).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.get(&key).await.is_none());
    }
}
