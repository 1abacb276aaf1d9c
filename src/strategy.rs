//! Caching strategies
//!
//! A strategy decides how long a cached sub-request stays fresh (`max_age`)
//! and for how much longer it may still be served while a background
//! revalidation runs (`stale_while_revalidate`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache visibility mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    Public,
    Private,
    NoStore,
}

/// How a sub-request result is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachingStrategy {
    pub mode: CacheMode,
    pub max_age: Duration,
    pub stale_while_revalidate: Duration,
}

impl CachingStrategy {
    /// Never cache
    pub const fn no_store() -> Self {
        Self {
            mode: CacheMode::NoStore,
            max_age: Duration::ZERO,
            stale_while_revalidate: Duration::ZERO,
        }
    }

    /// Fresh for one second, served stale for nine more
    pub const fn short() -> Self {
        Self::custom(Duration::from_secs(1), Duration::from_secs(9))
    }

    /// Fresh for one hour, served stale for 23 more hours
    pub const fn long() -> Self {
        Self::custom(Duration::from_secs(3600), Duration::from_secs(82_800))
    }

    /// Public strategy with explicit windows
    pub const fn custom(max_age: Duration, stale_while_revalidate: Duration) -> Self {
        Self {
            mode: CacheMode::Public,
            max_age,
            stale_while_revalidate,
        }
    }

    /// Same windows, private visibility
    pub const fn private(self) -> Self {
        Self {
            mode: CacheMode::Private,
            ..self
        }
    }

    pub fn is_no_store(&self) -> bool {
        self.mode == CacheMode::NoStore
    }

    /// Age after which an entry is no longer served at all
    pub fn expires_after(&self) -> Duration {
        self.max_age.saturating_add(self.stale_while_revalidate)
    }

    /// Render as an HTTP `Cache-Control` header value
    pub fn cache_control_header(&self) -> String {
        match self.mode {
            CacheMode::NoStore => "no-store".to_owned(),
            CacheMode::Public | CacheMode::Private => {
                let visibility = if self.mode == CacheMode::Public {
                    "public"
                } else {
                    "private"
                };
                let mut header = format!("{}, max-age={}", visibility, self.max_age.as_secs());
                if !self.stale_while_revalidate.is_zero() {
                    header.push_str(&format!(
                        ", stale-while-revalidate={}",
                        self.stale_while_revalidate.as_secs()
                    ));
                }
                header
            }
        }
    }
}

impl Default for CachingStrategy {
    fn default() -> Self {
        Self::short()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_windows() {
        let short = CachingStrategy::short();
        assert_eq!(short.max_age, Duration::from_secs(1));
        assert_eq!(short.expires_after(), Duration::from_secs(10));

        let long = CachingStrategy::long();
        assert_eq!(long.expires_after(), Duration::from_secs(86_400));

        assert!(CachingStrategy::no_store().is_no_store());
        assert!(!short.is_no_store());
    }

    #[test]
    fn test_cache_control_header() {
        assert_eq!(
            CachingStrategy::short().cache_control_header(),
            "public, max-age=1, stale-while-revalidate=9"
        );
        assert_eq!(
            CachingStrategy::no_store().cache_control_header(),
            "no-store"
        );
        assert_eq!(
            CachingStrategy::custom(Duration::from_secs(60), Duration::ZERO)
                .private()
                .cache_control_header(),
            "private, max-age=60"
        );
    }
}
