//! swrcache - Stale-while-revalidate sub-request cache
//!
//! This library wraps asynchronous producers (HTTP sub-requests, database
//! queries, anything returning a serializable value) with a cache-aside layer:
//! - Fresh entries are served directly
//! - Stale entries are served immediately and refreshed in the background
//! - Misses call the producer and write the result back in the background
//!
//! The cache supports:
//! - Pluggable backends (in-memory Moka, Redis, or both tiered)
//! - Predefined and custom caching strategies
//! - A per-instance revalidation lock so a stale key is refreshed once at a time
//! - Host-awaited deferred tasks for background writes
//! - Fire-and-forget observability events

mod backend;
mod clock;
mod config;
mod deferred;
mod error;
pub mod events;
pub mod fetch;
pub mod freshness;
mod key;
mod lock;
mod memory_backend;
mod redis_backend;
mod strategy;
mod subrequest_cache;
mod tiered_backend;

pub use backend::{CacheBackend, CacheEntry, EntryMetadata};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use deferred::{DeferredTask, DeferredTasks, Detached, WaitUntil};
pub use error::CacheError;
pub use events::{CacheStatus, DebugInfo, EventSink, SubrequestEvent};
pub use fetch::{CachedResponse, FetchCacheOptions, ResponseBody, ReturnType, check_graphql_errors};
pub use freshness::Freshness;
pub use key::{CacheKey, KeyPart};
pub use lock::{RevalidationGuard, RevalidationLock};
pub use memory_backend::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use strategy::{CacheMode, CachingStrategy};
pub use subrequest_cache::{
    Cacheable, ShouldCache, SubrequestCache, SubrequestCacheBuilder, WithCacheOptions,
};
pub use tiered_backend::TieredBackend;

// Re-export async_trait for backend implementors
pub use async_trait::async_trait;
