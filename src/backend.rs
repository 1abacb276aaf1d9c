//! Cache backend abstraction
//!
//! Backends store type-erased JSON values together with the metadata needed
//! to judge their freshness. Keys arriving here are already hashed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::freshness::{self, Freshness};
use crate::{CacheError, CachingStrategy};

/// When and under which strategy an entry was written
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub stored_at: SystemTime,
    pub strategy: CachingStrategy,
}

impl EntryMetadata {
    pub fn freshness(&self, now: SystemTime) -> Freshness {
        freshness::evaluate(self.stored_at, &self.strategy, now)
    }
}

/// A stored value and its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub metadata: EntryMetadata,
}

/// Storage behind the sub-request cache.
///
/// Implementations should drop entries once `metadata.strategy.expires_after()`
/// has elapsed; the cache also checks freshness itself, so lingering entries
/// are harmless.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Look up an entry
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry, replacing any previous one
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove an entry
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
