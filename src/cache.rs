use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// Time-bounded cache of parsed external content, keyed by source URL
///
/// One instance exists per content class (feeds, calendars, weather) so each
/// class keeps its own freshness window. A failed refresh is reported to the
/// caller and never replaced by stale data.
pub struct TtlCache<T> {
    name: &'static str,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    #[must_use]
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key` if it is still fresh
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Return the fresh cached value for `key`, or run `fetch` and cache its result.
    ///
    /// # Errors
    ///
    /// Propagates the error from `fetch`; the cache is left untouched.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(key) {
            debug!("{} cache hit for {key}", self.name);
            return Ok(value);
        }

        debug!("{} cache miss for {key}; fetching", self.name);
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Store `value` under `key`, reclaiming every expired entry on the way.
    fn insert(&self, key: &str, value: T) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
        let swept = before - entries.len();
        if swept > 0 {
            debug!("{} cache dropped {swept} expired entries", self.name);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Forget the entry for `key`, e.g. after a widget stops using that URL.
    pub fn evict(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.remove(key).is_some();
        if removed {
            debug!("{} cache evicted {key}", self.name);
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
