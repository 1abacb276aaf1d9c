//! Cache-aside wrapper with stale-while-revalidate
//!
//! [`SubrequestCache::run`] wraps an async producer:
//! - fresh entry: served from the backend, producer not called
//! - stale entry: served from the backend, producer called in the background
//!   to refresh it (at most one refresh per key at a time in this instance)
//! - no entry: producer called, result returned and written back in the
//!   background
//!
//! Background work goes through the configured [`WaitUntil`] registrar and
//! never affects what the caller receives.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, warn};

use crate::deferred::{Detached, WaitUntil};
use crate::events::{self, CacheStatus, DebugInfo, EventSink, SubrequestEvent};
use crate::freshness::Freshness;
use crate::{
    CacheBackend, CacheConfig, CacheEntry, CacheError, CacheKey, CachingStrategy, Clock,
    EntryMetadata, RevalidationLock, SystemClock,
};

/// Trait for values the cache can store
pub trait Cacheable: Serialize + DeserializeOwned + Send + 'static {}
impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// Predicate deciding whether a produced value is written to the cache
pub type ShouldCache<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Per-call options for [`SubrequestCache::run`]
pub struct WithCacheOptions<T> {
    /// Falls back to [`CacheConfig::default_strategy`] when unset
    pub strategy: Option<CachingStrategy>,
    /// Everything is cached when unset
    pub should_cache: Option<ShouldCache<T>>,
    pub debug_info: Option<DebugInfo>,
}

impl<T> Default for WithCacheOptions<T> {
    fn default() -> Self {
        Self {
            strategy: None,
            should_cache: None,
            debug_info: None,
        }
    }
}

impl<T> Clone for WithCacheOptions<T> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy,
            should_cache: self.should_cache.clone(),
            debug_info: self.debug_info.clone(),
        }
    }
}

impl<T> WithCacheOptions<T> {
    pub fn strategy(mut self, strategy: CachingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn should_cache(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.should_cache = Some(Arc::new(predicate));
        self
    }

    pub fn debug_info(mut self, debug_info: DebugInfo) -> Self {
        self.debug_info = Some(debug_info);
        self
    }
}

fn allows<T>(should_cache: &Option<ShouldCache<T>>, value: &T) -> bool {
    should_cache.as_ref().is_none_or(|predicate| predicate(value))
}

/// Hashed key plus its readable form
#[derive(Debug, Clone)]
struct Target {
    key: String,
    descriptor: String,
}

struct SubrequestCacheInner {
    backend: Option<Arc<dyn CacheBackend>>,
    lock: RevalidationLock,
    clock: Arc<dyn Clock>,
    wait_until: Arc<dyn WaitUntil>,
    /// Whether the host awaits background work
    deferred: bool,
    events: Option<Arc<dyn EventSink>>,
    config: CacheConfig,
}

impl SubrequestCacheInner {
    fn emit(
        &self,
        target: &Target,
        status: Option<CacheStatus>,
        start_time: SystemTime,
        debug_info: Option<&DebugInfo>,
    ) {
        events::emit(
            self.events.as_ref(),
            SubrequestEvent {
                key: target.key.clone(),
                descriptor: target.descriptor.clone(),
                status,
                start_time,
                deferred: self.deferred,
                debug_info: debug_info.cloned(),
            },
        );
    }

    /// Write a value back; failures are logged only
    async fn store(
        &self,
        backend: &Arc<dyn CacheBackend>,
        target: &Target,
        value: serde_json::Value,
        strategy: CachingStrategy,
        start_time: SystemTime,
        debug_info: Option<&DebugInfo>,
    ) {
        let entry = CacheEntry {
            value,
            metadata: EntryMetadata {
                stored_at: self.clock.now(),
                strategy,
            },
        };

        match backend.put(&target.key, entry).await {
            Ok(()) => self.emit(target, Some(CacheStatus::Put), start_time, debug_info),
            Err(e) => warn!(
                "Cache PUT error for {} (key: {}): {}. Continuing.",
                target.descriptor, target.key, e
            ),
        }
    }

    /// Refresh a stale entry in the background unless a refresh is already running
    fn spawn_revalidation<T, E, F, Fut>(
        self: &Arc<Self>,
        backend: Arc<dyn CacheBackend>,
        target: &Target,
        strategy: CachingStrategy,
        produce: F,
        should_cache: Option<ShouldCache<T>>,
        debug_info: Option<DebugInfo>,
    ) where
        T: Cacheable,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let Some(guard) = self.lock.try_acquire(&target.key) else {
            debug!("Revalidation already in flight for {}", target.descriptor);
            return;
        };

        let inner = Arc::clone(self);
        let target = target.clone();
        let task = async move {
            // Released when this task ends, however it ends
            let _guard = guard;
            let revalidate_start = inner.clock.now();

            let result = match produce().await {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        "SWR in sub-request failed: {} (key: {})",
                        e, target.descriptor
                    );
                    return;
                }
            };

            if !allows(&should_cache, &result) {
                debug!("Revalidated value for {} not cached", target.descriptor);
                return;
            }

            let Some(value) = encode(&target, &result) else {
                return;
            };
            inner
                .store(
                    &backend,
                    &target,
                    value,
                    strategy,
                    revalidate_start,
                    debug_info.as_ref(),
                )
                .await;
        };

        self.wait_until.wait_until(Box::pin(task));
    }
}

fn encode<T: Serialize>(target: &Target, value: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "Failed to serialize value for {}: {}. Not caching.",
                target.descriptor, e
            );
            None
        }
    }
}

/// Stale-while-revalidate cache for sub-requests
#[derive(Clone)]
pub struct SubrequestCache {
    inner: Arc<SubrequestCacheInner>,
}

impl SubrequestCache {
    pub fn builder(config: CacheConfig) -> SubrequestCacheBuilder {
        SubrequestCacheBuilder {
            config,
            backend: None,
            clock: None,
            wait_until: None,
            events: None,
        }
    }

    /// A cache without a backend; every call goes straight to the producer
    pub fn passthrough() -> Self {
        Self::builder(CacheConfig::default()).build()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Keys this instance is currently revalidating
    pub fn revalidation_lock(&self) -> &RevalidationLock {
        &self.inner.lock
    }

    /// The backend key a [`CacheKey`] maps to
    pub fn hash_key(&self, key: &CacheKey) -> String {
        key.hash(self.inner.config.key_namespace.as_deref())
    }

    /// Return `produce`'s result, caching it under `key`.
    ///
    /// Errors from `produce` are returned only when it runs on the caller's
    /// path (miss or uncached). Cache failures are logged and never returned.
    pub async fn run<T, E, F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        produce: F,
        options: WithCacheOptions<T>,
    ) -> Result<T, E>
    where
        T: Cacheable,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let inner = &self.inner;
        let start_time = inner.clock.now();
        let key = key.into();
        let target = Target {
            key: self.hash_key(&key),
            descriptor: key.to_string(),
        };
        let WithCacheOptions {
            strategy,
            should_cache,
            debug_info,
        } = options;
        let strategy = strategy.unwrap_or(inner.config.default_strategy);

        let backend = match &inner.backend {
            Some(backend) if !strategy.is_no_store() => Arc::clone(backend),
            _ => {
                let result = produce().await?;
                inner.emit(&target, None, start_time, debug_info.as_ref());
                return Ok(result);
            }
        };

        let cached = match backend.get(&target.key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(
                    "Cache GET error for {} ({}). Falling back to producer.",
                    target.descriptor, e
                );
                None
            }
        };

        if let Some(entry) = cached {
            let status = match entry.metadata.freshness(inner.clock.now()) {
                Freshness::Fresh => Some(CacheStatus::Hit),
                Freshness::Stale => Some(CacheStatus::Stale),
                Freshness::Expired => {
                    debug!("Cached entry for {} expired", target.descriptor);
                    None
                }
            };

            if let Some(status) = status {
                match serde_json::from_value::<T>(entry.value) {
                    Ok(value) => {
                        if status == CacheStatus::Stale {
                            inner.spawn_revalidation(
                                Arc::clone(&backend),
                                &target,
                                strategy,
                                produce,
                                should_cache,
                                debug_info.clone(),
                            );
                        }
                        inner.emit(&target, Some(status), start_time, debug_info.as_ref());
                        return Ok(value);
                    }
                    Err(e) => warn!(
                        "Failed to deserialize cached value for {}: {}. Treating as miss.",
                        target.descriptor, e
                    ),
                }
            }
        }

        let result = produce().await?;
        inner.emit(
            &target,
            Some(CacheStatus::Miss),
            start_time,
            debug_info.as_ref(),
        );

        if allows(&should_cache, &result)
            && let Some(value) = encode(&target, &result)
        {
            let task_inner = Arc::clone(inner);
            let task = async move {
                let put_start = task_inner.clock.now();
                task_inner
                    .store(
                        &backend,
                        &target,
                        value,
                        strategy,
                        put_start,
                        debug_info.as_ref(),
                    )
                    .await;
            };
            inner.wait_until.wait_until(Box::pin(task));
        }

        Ok(result)
    }

    /// Remove the entry for `key` from the backend
    pub async fn invalidate(&self, key: impl Into<CacheKey>) -> Result<(), CacheError> {
        let Some(backend) = &self.inner.backend else {
            return Ok(());
        };
        let key = key.into();
        debug!("Invalidating cache for {}", key);
        backend.delete(&self.hash_key(&key)).await
    }
}

/// Builder for [`SubrequestCache`]
pub struct SubrequestCacheBuilder {
    config: CacheConfig,
    backend: Option<Arc<dyn CacheBackend>>,
    clock: Option<Arc<dyn Clock>>,
    wait_until: Option<Arc<dyn WaitUntil>>,
    events: Option<Arc<dyn EventSink>>,
}

impl SubrequestCacheBuilder {
    pub fn backend(self, backend: impl CacheBackend) -> Self {
        self.shared_backend(Arc::new(backend))
    }

    pub fn shared_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registrar the host awaits before finishing a unit of work.
    /// Without one, background work is spawned and forgotten.
    pub fn wait_until(mut self, wait_until: Arc<dyn WaitUntil>) -> Self {
        self.wait_until = Some(wait_until);
        self
    }

    pub fn event_sink(mut self, sink: impl EventSink) -> Self {
        self.events = Some(Arc::new(sink));
        self
    }

    pub fn build(self) -> SubrequestCache {
        let deferred = self.wait_until.is_some();
        SubrequestCache {
            inner: Arc::new(SubrequestCacheInner {
                backend: self.backend,
                lock: RevalidationLock::new(),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                wait_until: self.wait_until.unwrap_or_else(|| Arc::new(Detached)),
                deferred,
                events: self.events,
                config: self.config,
            }),
        }
    }
}
