//! Redis backend, shared across instances

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::{CacheBackend, CacheConfig, CacheEntry, CacheError};

/// Stores JSON-encoded entries with a TTL covering the stale window
#[derive(Clone)]
pub struct RedisBackend {
    redis: redis::aio::ConnectionManager,
    key_prefix: String,
}

impl RedisBackend {
    /// Connect using the given client
    pub async fn new(redis_client: redis::Client, config: &CacheConfig) -> Result<Self, CacheError> {
        let redis = redis::aio::ConnectionManager::new(redis_client).await?;
        Ok(Self {
            redis,
            key_prefix: config.redis_key_prefix.clone(),
        })
    }

    fn format_key(&self, key: &str) -> String {
        format_key(&self.key_prefix, key)
    }
}

fn format_key(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

/// Whole seconds covering the entry's lifetime; Redis rejects a zero TTL
fn ttl_seconds(entry: &CacheEntry) -> u64 {
    let expires_after = entry.metadata.strategy.expires_after();
    let secs = expires_after.as_secs() + u64::from(expires_after.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let redis_key = self.format_key(key);
        let mut conn = self.redis.clone();

        let Some(json) = conn.get::<_, Option<String>>(&redis_key).await? else {
            debug!("Redis miss for key: {}", redis_key);
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry>(&json) {
            Ok(entry) => {
                debug!("Redis hit for key: {}", redis_key);
                Ok(Some(entry))
            }
            Err(e) => {
                warn!(
                    "Failed to deserialize cached entry for key {}: {}. Deleting corrupt entry.",
                    redis_key, e
                );
                if let Err(del_err) = conn.del::<_, ()>(&redis_key).await {
                    warn!(
                        "Failed to delete corrupt entry for key {}: {}",
                        redis_key, del_err
                    );
                }
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let redis_key = self.format_key(key);
        let ttl = ttl_seconds(&entry);
        let json = serde_json::to_string(&entry)?;

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(&redis_key, json, ttl).await?;
        debug!("Redis SETEX {} ({}s)", redis_key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let redis_key = self.format_key(key);
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(&redis_key).await?;
        Ok(())
    }
}
