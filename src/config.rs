//! Cache configuration

use crate::CachingStrategy;

/// Configuration for the sub-request cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held by the in-memory backend
    pub memory_max_capacity: u64,
    /// Strategy used when a call does not name one
    pub default_strategy: CachingStrategy,
    /// Prefix for keys written to Redis
    pub redis_key_prefix: String,
    /// Mixed into every key hash; changing it orphans all previous entries
    pub key_namespace: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_max_capacity: 1000,
            default_strategy: CachingStrategy::short(),
            redis_key_prefix: "cache:subrequest:".to_owned(),
            key_namespace: None,
        }
    }
}
