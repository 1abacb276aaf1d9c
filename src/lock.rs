//! Process-local revalidation lock
//!
//! Tracks which hashed keys have a background revalidation running so a
//! stale entry is refreshed at most once at a time by this cache instance.
//! Other processes sharing the same backend are not coordinated.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Set of keys currently being revalidated
#[derive(Debug, Clone, Default)]
pub struct RevalidationLock {
    in_flight: InFlight,
}

impl RevalidationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` if no revalidation holds it.
    ///
    /// The key stays claimed until the returned guard is dropped.
    pub fn try_acquire(&self, key: &str) -> Option<RevalidationGuard> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(key.to_owned()) {
            return None;
        }
        Some(RevalidationGuard {
            key: key.to_owned(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its key when dropped, whether the revalidation finished,
/// failed, panicked or was never polled.
#[derive(Debug)]
pub struct RevalidationGuard {
    key: String,
    in_flight: InFlight,
}

impl RevalidationGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        debug!("Revalidation lock released for key: {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let lock = RevalidationLock::new();
        let guard = lock.try_acquire("k").expect("first acquire");
        assert!(lock.is_locked("k"));
        assert!(lock.try_acquire("k").is_none());

        // Other keys are independent
        let other = lock.try_acquire("j");
        assert!(other.is_some());
        assert_eq!(lock.len(), 2);

        drop(guard);
        assert!(!lock.is_locked("k"));
        assert!(lock.try_acquire("k").is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let lock = RevalidationLock::new();
        let clone = lock.clone();
        let _guard = lock.try_acquire("k").expect("acquire");
        assert!(clone.is_locked("k"));
    }

    #[test]
    fn test_released_on_panic() {
        let lock = RevalidationLock::new();
        let held = lock.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = held.try_acquire("k").expect("acquire");
            panic!("producer blew up");
        });
        assert!(result.is_err());
        assert!(lock.is_empty());
    }
}
