//! Two-layer backend
//!
//! - L1: fast, usually process-local (e.g. [`MemoryBackend`](crate::MemoryBackend))
//! - L2: slower, usually shared across instances (e.g. [`RedisBackend`](crate::RedisBackend))
//!
//! Reads fall through L1 to L2 and populate L1 on an L2 hit. Writes and
//! deletes go to both layers.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{CacheBackend, CacheEntry, CacheError};

pub struct TieredBackend<L1, L2>
where
    L1: CacheBackend,
    L2: CacheBackend,
{
    l1: L1,
    l2: L2,
}

impl<L1, L2> TieredBackend<L1, L2>
where
    L1: CacheBackend,
    L2: CacheBackend,
{
    pub fn new(l1: L1, l2: L2) -> Self {
        Self { l1, l2 }
    }

    pub fn l1(&self) -> &L1 {
        &self.l1
    }

    pub fn l2(&self) -> &L2 {
        &self.l2
    }
}

#[async_trait]
impl<L1, L2> CacheBackend for TieredBackend<L1, L2>
where
    L1: CacheBackend,
    L2: CacheBackend,
{
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.l1.get(key).await {
            Ok(Some(entry)) => {
                debug!("Cache hit L1 for key: {}", key);
                return Ok(Some(entry));
            }
            Ok(None) => debug!("Cache miss L1 for key: {}", key),
            Err(e) => warn!("L1 GET error for key {} ({}). Falling back to L2.", key, e),
        }

        let Some(entry) = self.l2.get(key).await? else {
            debug!("Cache miss L2 for key: {}", key);
            return Ok(None);
        };

        debug!("Cache hit L2 for key: {}", key);
        if let Err(e) = self.l1.put(key, entry.clone()).await {
            warn!("L1 populate error for key {}: {}. Continuing.", key, e);
        }
        Ok(Some(entry))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let l2_result = self.l2.put(key, entry.clone()).await;
        if let Err(e) = self.l1.put(key, entry).await {
            warn!("L1 PUT error for key {}: {}. Continuing.", key, e);
        }
        l2_result
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let l2_result = self.l2.delete(key).await;
        if let Err(e) = self.l1.delete(key).await {
            warn!("L1 DEL error for key {}: {}. Continuing.", key, e);
        }
        l2_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CachingStrategy, EntryMetadata, MemoryBackend};
    use std::time::SystemTime;

    /// Backend that fails every operation
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Backend("unavailable".into()))
        }

        async fn put(&self, _key: &str, _entry: CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Backend("unavailable".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("unavailable".into()))
        }
    }

    fn entry(value: &str) -> CacheEntry {
        CacheEntry {
            value: serde_json::json!(value),
            metadata: EntryMetadata {
                stored_at: SystemTime::now(),
                strategy: CachingStrategy::long(),
            },
        }
    }

    #[tokio::test]
    async fn test_l2_hit_populates_l1() {
        let tiered = TieredBackend::new(MemoryBackend::default(), MemoryBackend::default());
        tiered.l2().put("k", entry("A")).await.expect("put");

        assert!(tiered.l1().get("k").await.expect("get").is_none());
        let found = tiered.get("k").await.expect("get").expect("entry");
        assert_eq!(found.value, serde_json::json!("A"));
        assert!(tiered.l1().get("k").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_put_and_delete_reach_both_layers() {
        let tiered = TieredBackend::new(MemoryBackend::default(), MemoryBackend::default());
        tiered.put("k", entry("A")).await.expect("put");
        assert!(tiered.l1().get("k").await.expect("get").is_some());
        assert!(tiered.l2().get("k").await.expect("get").is_some());

        tiered.delete("k").await.expect("delete");
        assert!(tiered.l1().get("k").await.expect("get").is_none());
        assert!(tiered.l2().get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_broken_l1_does_not_hide_l2() {
        let tiered = TieredBackend::new(BrokenBackend, MemoryBackend::default());
        tiered.put("k", entry("A")).await.expect("put reaches L2");
        let found = tiered.get("k").await.expect("get").expect("entry");
        assert_eq!(found.value, serde_json::json!("A"));
    }

    #[tokio::test]
    async fn test_broken_l2_surfaces_error() {
        let tiered = TieredBackend::new(MemoryBackend::default(), BrokenBackend);
        assert!(tiered.get("k").await.is_err());
        assert!(tiered.put("k", entry("A")).await.is_err());
    }
}
