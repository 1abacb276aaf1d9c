//! Freshness evaluation for cached entries

use std::time::{Duration, SystemTime};

use crate::CachingStrategy;

/// Where an entry sits relative to its strategy's windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within `max_age`; serve as is
    Fresh,
    /// Past `max_age` but within the stale window; serve and revalidate
    Stale,
    /// Past both windows; treat as a miss
    Expired,
}

/// Classify an entry stored at `stored_at` under `strategy`, as seen at `now`.
///
/// A `stored_at` later than `now` counts as age zero.
pub fn evaluate(stored_at: SystemTime, strategy: &CachingStrategy, now: SystemTime) -> Freshness {
    if strategy.is_no_store() {
        return Freshness::Expired;
    }

    let age = now.duration_since(stored_at).unwrap_or(Duration::ZERO);

    if age <= strategy.max_age {
        Freshness::Fresh
    } else if age <= strategy.expires_after() {
        Freshness::Stale
    } else {
        Freshness::Expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
    }

    #[test]
    fn test_short_strategy_boundaries() {
        let strategy = CachingStrategy::short();
        let stored = at(0);

        assert_eq!(evaluate(stored, &strategy, at(0)), Freshness::Fresh);
        assert_eq!(evaluate(stored, &strategy, at(500)), Freshness::Fresh);
        assert_eq!(evaluate(stored, &strategy, at(1000)), Freshness::Fresh);
        assert_eq!(evaluate(stored, &strategy, at(1001)), Freshness::Stale);
        assert_eq!(evaluate(stored, &strategy, at(10_000)), Freshness::Stale);
        assert_eq!(evaluate(stored, &strategy, at(10_001)), Freshness::Expired);
    }

    #[test]
    fn test_no_store_is_always_expired() {
        let strategy = CachingStrategy::no_store();
        assert_eq!(evaluate(at(0), &strategy, at(0)), Freshness::Expired);
    }

    #[test]
    fn test_zero_stale_window_skips_stale() {
        let strategy = CachingStrategy::custom(Duration::from_secs(5), Duration::ZERO);
        assert_eq!(evaluate(at(0), &strategy, at(5000)), Freshness::Fresh);
        assert_eq!(evaluate(at(0), &strategy, at(5001)), Freshness::Expired);
    }

    #[test]
    fn test_future_stored_at_counts_as_fresh() {
        let strategy = CachingStrategy::short();
        assert_eq!(evaluate(at(9000), &strategy, at(0)), Freshness::Fresh);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let strategy = CachingStrategy::long();
        let first = evaluate(at(0), &strategy, at(4_000_000));
        let second = evaluate(at(0), &strategy, at(4_000_000));
        assert_eq!(first, second);
        assert_eq!(first, Freshness::Stale);
    }
}
