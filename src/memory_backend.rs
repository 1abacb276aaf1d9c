//! In-memory backend on top of Moka

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{CacheBackend, CacheConfig, CacheEntry, CacheError};

/// Expires each entry once its stale window has passed
struct EntryExpiry;

impl Expiry<String, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.metadata.strategy.expires_after())
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.metadata.strategy.expires_after())
    }
}

/// Capacity-bounded, process-local backend
#[derive(Clone)]
pub struct MemoryBackend {
    cache: Cache<String, Arc<CacheEntry>>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.memory_max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { cache }
    }

    /// Number of entries, after pending maintenance has run
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.cache.get(key).await;
        debug!(
            "Memory backend {} for key: {}",
            if entry.is_some() { "hit" } else { "miss" },
            key
        );
        Ok(entry.map(|e| e.as_ref().clone()))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.cache.insert(key.to_owned(), Arc::new(entry)).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CachingStrategy, EntryMetadata};
    use std::time::SystemTime;

    fn entry(value: &str, strategy: CachingStrategy) -> CacheEntry {
        CacheEntry {
            value: serde_json::json!(value),
            metadata: EntryMetadata {
                stored_at: SystemTime::now(),
                strategy,
            },
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = MemoryBackend::default();
        assert!(backend.get("k").await.expect("get").is_none());

        backend
            .put("k", entry("A", CachingStrategy::long()))
            .await
            .expect("put");
        let found = backend.get("k").await.expect("get").expect("entry");
        assert_eq!(found.value, serde_json::json!("A"));

        backend
            .put("k", entry("B", CachingStrategy::long()))
            .await
            .expect("put");
        let found = backend.get("k").await.expect("get").expect("entry");
        assert_eq!(found.value, serde_json::json!("B"));
        assert_eq!(backend.entry_count().await, 1);

        backend.delete("k").await.expect("delete");
        assert!(backend.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_entry_expires_after_stale_window() {
        let backend = MemoryBackend::default();
        let strategy =
            CachingStrategy::custom(Duration::from_millis(20), Duration::from_millis(20));
        backend.put("k", entry("A", strategy)).await.expect("put");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(backend.get("k").await.expect("get").is_none());
    }
}
