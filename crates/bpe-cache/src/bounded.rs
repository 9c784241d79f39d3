//! Bounded keyed cache using moka
//!
//! Fixed-capacity, thread-safe mapping from string key to value. Every tier of
//! the deployment cache is one [`BoundedCache`].

use crate::config::Eviction;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::{Cache, CacheBuilder};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for one bounded cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    /// Tier name ("process", "BPMN", ...)
    pub name: String,
    /// Capacity the tier was built with
    pub capacity: u64,
    /// Number of entries in cache
    pub entry_count: u64,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
}

impl TierStats {
    /// Calculate the hit rate (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Fixed-capacity cache keyed by string
///
/// - `put` is last-writer-wins
/// - `remove` of an absent key is a no-op
/// - Once capacity is exceeded the policy picks a victim (least recently
///   used by default)
pub struct BoundedCache<V> {
    name: String,
    capacity: u64,
    inner: Cache<String, V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create LRU cache with max capacity
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        Self::with_eviction(name, capacity, Eviction::Lru)
    }

    /// Create cache with the given eviction policy
    #[must_use]
    pub fn with_eviction(name: impl Into<String>, capacity: u64, eviction: Eviction) -> Self {
        Self::from_builder(name, capacity, Self::builder(capacity, eviction))
    }

    /// Create cache that calls `listener` for every entry dropped to stay
    /// within capacity
    ///
    /// Explicit removals, `clear` and overwrites do not reach the listener.
    /// It runs on the thread performing maintenance, which is the thread
    /// that called `put`.
    #[must_use]
    pub fn with_capacity_listener<F>(name: impl Into<String>, capacity: u64, eviction: Eviction, listener: F) -> Self
    where
        F: Fn(&str, V) + Send + Sync + 'static,
    {
        let builder = Self::builder(capacity, eviction).eviction_listener(
            move |key: Arc<String>, value: V, cause: RemovalCause| {
                if matches!(cause, RemovalCause::Size) {
                    listener(key.as_str(), value);
                }
            },
        );
        Self::from_builder(name, capacity, builder)
    }

    fn builder(capacity: u64, eviction: Eviction) -> CacheBuilder<String, V, Cache<String, V>> {
        let policy = match eviction {
            Eviction::Lru => EvictionPolicy::lru(),
            Eviction::TinyLfu => EvictionPolicy::tiny_lfu(),
        };
        Cache::builder().max_capacity(capacity).eviction_policy(policy)
    }

    fn from_builder(
        name: impl Into<String>,
        capacity: u64,
        builder: CacheBuilder<String, V, Cache<String, V>>,
    ) -> Self {
        Self {
            name: name.into(),
            capacity,
            inner: builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Tier name used in stats and logs
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of entries
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get value, recording the access for recency
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let found = self.inner.get(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert or overwrite value
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value);
        // Apply the capacity bound before returning so callers observe it.
        self.inner.run_pending_tasks();
    }

    /// Remove value, returning it if present
    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.remove(key)
    }

    /// Check presence without touching recency or statistics
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Remove every entry
    pub fn clear(&self) {
        let keys: Vec<_> = self.inner.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.inner.invalidate(key.as_str());
        }
        // entries put while iterating
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    /// Approximate entry count
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Snapshot of every entry, in no particular order
    ///
    /// Does not touch recency or statistics.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, V)> {
        self.inner
            .iter()
            .map(|(key, value)| (key.as_ref().clone(), value))
            .collect()
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> TierStats {
        self.inner.run_pending_tasks();
        TierStats {
            name: self.name.clone(),
            capacity: self.capacity,
            entry_count: self.inner.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V> fmt::Debug for BoundedCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn put_get_remove() {
        let cache = BoundedCache::new("test", 10);
        cache.put("a", 1);
        assert_eq!(cache.get("a"), Some(1));

        cache.put("a", 2);
        assert_eq!(cache.get("a"), Some(2));

        assert_eq!(cache.remove("a"), Some(2));
        assert_eq!(cache.get("a"), None);
        // absent key is a no-op
        assert_eq!(cache.remove("a"), None);
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = BoundedCache::new("test", 2);
        cache.put("A", "a");
        cache.put("B", "b");
        cache.put("C", "c");

        assert_eq!(cache.get("A"), None);
        assert_eq!(cache.get("B"), Some("b"));
        assert_eq!(cache.get("C"), Some("c"));
    }

    #[test]
    fn get_refreshes_recency() {
        let cache = BoundedCache::new("test", 2);
        cache.put("A", "a");
        cache.put("B", "b");
        assert_eq!(cache.get("A"), Some("a"));
        cache.put("C", "c");

        assert_eq!(cache.get("B"), None);
        assert_eq!(cache.get("A"), Some("a"));
        assert_eq!(cache.get("C"), Some("c"));
    }

    #[test]
    fn capacity_listener_sees_size_evictions_only() {
        let dropped = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&dropped);
        let cache = BoundedCache::with_capacity_listener("test", 2, Eviction::Lru, move |key, value| {
            sink.lock().push((key.to_string(), value));
        });

        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("B", 3);
        cache.remove("B");
        cache.put("B", 4);
        cache.put("C", 5);
        cache.clear();

        assert_eq!(*dropped.lock(), vec![("A".to_string(), 1)]);
    }

    #[test]
    fn clear_empties_cache() {
        let cache = BoundedCache::new("test", 10);
        for i in 0..5 {
            cache.put(format!("k{i}"), i);
        }
        assert_eq!(cache.stats().entry_count, 5);

        cache.clear();
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = BoundedCache::new("process", 10);
        cache.put("a", 1);
        let _ = cache.get("a");
        let _ = cache.get("a");
        let _ = cache.get("b");

        let stats = cache.stats();
        assert_eq!(stats.name, "process");
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert!((TierStats::default().hit_rate() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn entries_snapshot() {
        let cache = BoundedCache::new("test", 10);
        cache.put("a", 1);
        cache.put("b", 2);
        let mut entries = cache.entries();
        entries.sort();
        assert_eq!(entries, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn contains_does_not_count() {
        let cache = BoundedCache::new("test", 10);
        cache.put("a", 1);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(cache.stats().hits + cache.stats().misses, 0);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let cache = Arc::new(BoundedCache::new("test", 1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("{t}-{i}");
                        cache.put(key.clone(), i);
                        assert_eq!(cache.get(&key), Some(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().entry_count, 800);
    }

    proptest! {
        #[test]
        fn prop_entry_count_never_exceeds_capacity(
            capacity in 1..16u64,
            keys in proptest::collection::vec(0..64u32, 1..200)
        ) {
            let cache = BoundedCache::new("prop", capacity);
            for key in &keys {
                cache.put(key.to_string(), *key);
            }
            prop_assert!(cache.stats().entry_count <= capacity);
        }

        #[test]
        fn prop_last_put_survives(
            keys in proptest::collection::vec(0..64u32, 1..100)
        ) {
            let cache = BoundedCache::new("prop", 8);
            for key in &keys {
                cache.put(key.to_string(), *key);
            }
            let last = keys.last().unwrap();
            prop_assert_eq!(cache.get(&last.to_string()), Some(*last));
        }
    }
}
