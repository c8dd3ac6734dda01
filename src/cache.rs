//! Time-bounded memoization keyed by request shape.
//!
//! Entries older than the configured TTL are treated as absent and dropped on
//! read. Writers flush the whole cache instead of tracking which keys a change
//! could affect.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    captured_at: Instant,
}

/// Concurrent key/value cache with lazy expiry and coarse invalidation.
pub struct QueryCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value stored under `key` unless it is older than the TTL.
    ///
    /// A stale entry is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        let fresh = self.entries.get(key).and_then(|entry| {
            (entry.captured_at.elapsed() <= self.ttl).then(|| entry.value.clone())
        });

        match fresh {
            Some(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            None => {
                let ttl = self.ttl;
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.captured_at.elapsed() > ttl)
                    .is_some()
                {
                    debug!(key, "cache entry expired");
                } else {
                    debug!(key, "cache miss");
                }
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry and restarting its clock.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                captured_at: Instant::now(),
            },
        );
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        let flushed = self.entries.len();
        self.entries.clear();
        debug!(flushed, "cache invalidated");
    }

    /// Drop entries older than the TTL; returns how many were removed.
    pub fn invalidate_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.captured_at.elapsed() <= self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_fresh_values() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.set("games:count", 4_u64);
        assert_eq!(cache.get("games:count"), Some(4));
        assert_eq!(cache.get("games:other"), None);
    }

    #[test]
    fn set_overwrites() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.set("k", 1);
        cache.set("k", 2);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stale_entries_are_absent_and_discarded() {
        let cache = QueryCache::new(Duration::ZERO);
        cache.set("k", "value".to_owned());
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all_flushes_everything() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn invalidate_expired_keeps_fresh_entries() {
        let stale = QueryCache::new(Duration::ZERO);
        stale.set("a", 1);
        stale.set("b", 2);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stale.invalidate_expired(), 2);

        let fresh = QueryCache::new(Duration::from_secs(60));
        fresh.set("a", 1);
        assert_eq!(fresh.invalidate_expired(), 0);
        assert_eq!(fresh.len(), 1);
    }
}
