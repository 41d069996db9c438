//! TTL/capacity-bounded result cache.
//!
//! Shared by the verification pipeline and the policy evaluator to avoid
//! redundant work. Entries expire at `cached_at + ttl`; expiry is enforced
//! lazily on access and by an explicit sweep. When capacity is exceeded the
//! entry with the oldest `cached_at` is evicted first. Every successful
//! `get` increments a per-entry hit counter used for hit-rate telemetry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use crate::types::Timestamp;

/// Smallest TTL accepted. Keeps the `valid_until > cached_at` invariant
/// even for a zero TTL request.
const MIN_TTL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub cached_at: Timestamp,
    pub valid_until: Timestamp,
    pub hit_count: u64,
    /// Insertion order, used to break eviction ties between entries
    /// cached within the same instant.
    seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.valid_until
    }
}

/// Aggregate counters for hit-rate telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
    next_seq: u64,
}

/// Thread-safe TTL + capacity bounded cache.
pub struct TtlCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache bounded to `capacity` entries.
    ///
    /// A zero capacity is treated as 1: a cache that can hold nothing
    /// would silently disable the hit path.
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            default_ttl: default_ttl.max(MIN_TTL),
        }
    }

    /// Fetch a value. Expired entries are removed and counted as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Timestamp::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.hit_count += 1;
                let value = entry.value.clone();
                inner.stats.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.entries.remove(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert with the default TTL.
    pub fn put(&self, key: K, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.put_at(key, value, ttl, Timestamp::now());
    }

    /// Insert with an explicit TTL and cache time. Exposed so tests can
    /// control eviction ordering without sleeping.
    pub fn put_at(&self, key: K, value: V, ttl: Duration, cached_at: Timestamp) {
        let ttl = ttl.max(MIN_TTL);
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        // Replacing an existing key never requires eviction.
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.cached_at, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest {
                inner.entries.remove(&oldest_key);
                inner.stats.evictions += 1;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                cached_at,
                valid_until: cached_at.plus(ttl),
                hit_count: 0,
                seq,
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.remove(key).map(|e| e.value)
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Timestamp::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));
        let removed = before - inner.entries.len();
        inner.stats.expirations += removed as u64;
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().expect("cache lock poisoned").stats
    }

    /// Hit count for a specific (live) entry.
    pub fn entry_hits(&self, key: &K) -> Option<u64> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.get(key).map(|e| e.hit_count)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.clear();
    }
}
