use crate::reaper::ReaperTask;
use crate::stats::CacheStats;
use crate::value::now_millis;
use crate::{CacheConfig, EvictionPolicy, Key, StatsSnapshot, Value};
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Outcome of a cache lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum GetOutcome {
    Hit(Value),
    Miss,
}

impl GetOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, GetOutcome::Hit(_))
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            GetOutcome::Hit(value) => Some(value),
            GetOutcome::Miss => None,
        }
    }
}

struct Entry {
    value: Value,
    /// Stamp taken when the key was first inserted. Overwrites keep it,
    /// so FIFO eviction tracks true insertion order.
    inserted_seq: u64,
    /// Stamp of the most recent successful access or write.
    accessed_seq: AtomicU64,
}

/// The concurrent local cache.
///
/// Single-key operations go through the sharded map without a global
/// lock; statistics are atomic counters. The optional reaper is a
/// background task owned by this value and stopped by [`Cache::shutdown`].
pub struct Cache {
    config: CacheConfig,
    entries: DashMap<Key, Entry>,
    /// Strictly increasing stamp source for LRU / FIFO bookkeeping.
    ticker: AtomicU64,
    stats: CacheStats,
    pub(crate) reaper: Mutex<Option<ReaperTask>>,
}

impl Cache {
    pub fn new(config: CacheConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            entries: DashMap::new(),
            ticker: AtomicU64::new(0),
            stats: CacheStats::new(),
            reaper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn next_seq(&self) -> u64 {
        self.ticker.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up `key`. An entry past its expiry is removed and reported
    /// as a miss; an expired value is never surfaced.
    pub fn get(&self, key: &Key) -> GetOutcome {
        let now = now_millis();

        enum Peek {
            Absent,
            Expired,
            Live(Value),
        }

        let peek = match self.entries.get(key) {
            None => Peek::Absent,
            Some(entry) if entry.value.is_expired(now) => Peek::Expired,
            Some(entry) => {
                entry.accessed_seq.store(self.next_seq(), Ordering::Relaxed);
                Peek::Live(entry.value.clone())
            }
        };

        match peek {
            Peek::Live(value) => {
                self.stats.record_hit();
                GetOutcome::Hit(value)
            }
            Peek::Expired => {
                // Re-check under the removal guard: a concurrent put may
                // have replaced the entry since we peeked.
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.value.is_expired(now))
                    .is_some()
                {
                    self.stats.record_expired(1);
                }
                self.stats.record_miss();
                GetOutcome::Miss
            }
            Peek::Absent => {
                self.stats.record_miss();
                GetOutcome::Miss
            }
        }
    }

    /// Insert or overwrite `key`. When the cache is bounded, inserting a
    /// new key at capacity first evicts exactly one entry per the
    /// configured policy. Overwrites never evict.
    pub fn put(&self, key: Key, value: Value) -> crate::Result<()> {
        if let Some(max_size) = self.config.max_size {
            if !self.entries.contains_key(&key) && self.entries.len() as u64 >= max_size {
                self.evict_one();
            }
        }

        let seq = self.next_seq();
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let inserted_seq = occupied.get().inserted_seq;
                occupied.insert(Entry {
                    value,
                    inserted_seq,
                    accessed_seq: AtomicU64::new(seq),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value,
                    inserted_seq: seq,
                    accessed_seq: AtomicU64::new(seq),
                });
            }
        }
        self.stats.record_put();
        Ok(())
    }

    /// Remove `key` and its bookkeeping. Removing an absent key is not
    /// an error.
    pub fn delete(&self, key: &Key) -> crate::Result<()> {
        self.entries.remove(key);
        self.stats.record_delete();
        Ok(())
    }

    /// True iff an unexpired entry for `key` exists right now.
    pub fn contains(&self, key: &Key) -> bool {
        let now = now_millis();
        self.entries
            .get(key)
            .map(|entry| !entry.value.is_expired(now))
            .unwrap_or(false)
    }

    pub fn clear(&self) -> crate::Result<()> {
        self.entries.clear();
        self.stats.record_clear();
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A point-in-time snapshot of the stored keys.
    pub fn keys(&self) -> HashSet<Key> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Scan out every entry whose expiry has passed, returning how many
    /// were removed. Safe to call concurrently with other operations.
    pub fn remove_expired(&self) -> usize {
        let now = now_millis();
        let expired: Vec<Key> = self
            .entries
            .iter()
            .filter(|e| e.value().value.is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self
                .entries
                .remove_if(&key, |_, entry| entry.value.is_expired(now))
                .is_some()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            self.stats.record_expired(removed as u64);
            tracing::debug!(removed, "removed expired cache entries");
        }
        removed
    }

    pub(crate) fn record_cleanup_cycle(&self) {
        self.stats.record_cleanup_cycle();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub fn stats_formatted(&self) -> String {
        self.stats.snapshot().to_formatted()
    }

    fn evict_one(&self) {
        let policy = self.config.eviction_policy;
        let victim = match policy {
            EvictionPolicy::Lru => self.min_by_stamp(|e| e.accessed_seq.load(Ordering::Relaxed)),
            EvictionPolicy::Fifo => self.min_by_stamp(|e| e.inserted_seq),
            EvictionPolicy::Random => {
                let len = self.entries.len();
                if len == 0 {
                    None
                } else {
                    let skip = rand::thread_rng().gen_range(0..len);
                    self.entries.iter().nth(skip).map(|e| e.key().clone())
                }
            }
        };

        if let Some(key) = victim {
            if self.entries.remove(&key).is_some() {
                self.stats.record_eviction(policy);
                tracing::debug!(key = %key, policy = %policy, "evicted cache entry");
            }
        }
    }

    fn min_by_stamp(&self, stamp: impl Fn(&Entry) -> u64) -> Option<Key> {
        self.entries
            .iter()
            .min_by_key(|e| stamp(e.value()))
            .map(|e| e.key().clone())
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("size", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn key(s: &str) -> Key {
        Key::new(s).unwrap()
    }

    fn bounded(max_size: u64, policy: EvictionPolicy) -> Cache {
        Cache::new(CacheConfig {
            max_size: Some(max_size),
            eviction_policy: policy,
            enable_auto_cleanup: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn put_get_delete_symmetry() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        let k = key("user:123");

        cache.put(k.clone(), Value::new("Alice")).unwrap();
        assert!(cache.contains(&k));
        match cache.get(&k) {
            GetOutcome::Hit(value) => assert_eq!(value.data, Bytes::from("Alice")),
            GetOutcome::Miss => panic!("expected a hit"),
        }

        cache.delete(&k).unwrap();
        assert!(!cache.contains(&k));
        assert_eq!(cache.get(&k), GetOutcome::Miss);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn expired_entries_are_never_surfaced() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        let k = key("k");

        cache
            .put(k.clone(), Value::new("v").with_expiry(now_millis() - 1))
            .unwrap();

        assert!(!cache.contains(&k));
        assert_eq!(cache.get(&k), GetOutcome::Miss);
        // The lookup removed the entry.
        assert_eq!(cache.size(), 0);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expired_removed, 1);
    }

    #[test]
    fn bounded_cache_never_exceeds_capacity() {
        let cache = bounded(3, EvictionPolicy::Lru);
        for i in 0..20 {
            cache.put(key(&format!("k{i}")), Value::new("v")).unwrap();
            assert!(cache.size() <= 3);
        }
        assert_eq!(cache.stats().evictions_lru, 17);
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let cache = bounded(2, EvictionPolicy::Lru);
        cache.put(key("k1"), Value::new("v1")).unwrap();
        cache.put(key("k2"), Value::new("v2")).unwrap();
        assert!(cache.get(&key("k1")).is_hit());
        cache.put(key("k3"), Value::new("v3")).unwrap();

        assert_eq!(cache.keys(), HashSet::from([key("k1"), key("k3")]));
    }

    #[test]
    fn fifo_evicts_oldest_insertion() {
        let cache = bounded(2, EvictionPolicy::Fifo);
        cache.put(key("k1"), Value::new("v1")).unwrap();
        cache.put(key("k2"), Value::new("v2")).unwrap();
        // Access does not promote under FIFO.
        assert!(cache.get(&key("k1")).is_hit());
        cache.put(key("k3"), Value::new("v3")).unwrap();

        assert_eq!(cache.keys(), HashSet::from([key("k2"), key("k3")]));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = bounded(2, EvictionPolicy::Lru);
        cache.put(key("k1"), Value::new("v1")).unwrap();
        cache.put(key("k2"), Value::new("v2")).unwrap();
        cache.put(key("k1"), Value::new("v1b")).unwrap();

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.stats().evictions_lru, 0);
    }

    #[test]
    fn fifo_overwrite_keeps_insertion_order() {
        let cache = bounded(2, EvictionPolicy::Fifo);
        cache.put(key("k1"), Value::new("v1")).unwrap();
        cache.put(key("k2"), Value::new("v2")).unwrap();
        cache.put(key("k1"), Value::new("v1b")).unwrap();
        cache.put(key("k3"), Value::new("v3")).unwrap();

        // k1 is still the oldest insertion despite the overwrite.
        assert_eq!(cache.keys(), HashSet::from([key("k2"), key("k3")]));
    }

    #[test]
    fn random_eviction_respects_the_bound() {
        let cache = bounded(4, EvictionPolicy::Random);
        for i in 0..50 {
            cache.put(key(&format!("k{i}")), Value::new("v")).unwrap();
        }
        assert_eq!(cache.size(), 4);
        assert_eq!(cache.stats().evictions_random, 46);
    }

    #[test]
    fn clear_wipes_everything() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        for i in 0..10 {
            cache.put(key(&format!("k{i}")), Value::new("v")).unwrap();
        }
        cache.clear().unwrap();
        assert_eq!(cache.size(), 0);
        assert!(cache.keys().is_empty());
        assert_eq!(cache.stats().clears, 1);
    }

    #[test]
    fn remove_expired_is_idempotent() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        cache
            .put(key("dead"), Value::new("v").with_expiry(now_millis() - 1))
            .unwrap();
        cache.put(key("live"), Value::new("v")).unwrap();

        assert_eq!(cache.remove_expired(), 1);
        let stats = cache.stats();

        assert_eq!(cache.remove_expired(), 0);
        assert_eq!(cache.stats(), stats);
        assert_eq!(cache.keys(), HashSet::from([key("live")]));
    }

    #[test]
    fn stats_are_monotonic_between_resets() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        cache.put(key("k"), Value::new("v")).unwrap();
        cache.get(&key("k"));
        let first = cache.stats();

        cache.get(&key("k"));
        cache.get(&key("missing"));
        let second = cache.stats();

        assert!(second.hits >= first.hits);
        assert!(second.misses >= first.misses);
        assert!(second.puts >= first.puts);

        cache.reset_stats();
        let reset = cache.stats();
        assert_eq!(reset.hits, 0);
        assert_eq!(reset.misses, 0);
        assert!(reset.created_at_ms >= second.created_at_ms);
    }
}
