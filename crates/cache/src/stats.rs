use crate::value::now_millis;
use crate::EvictionPolicy;
use num_format::{Locale, ToFormattedString};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonic operation counters, updated lock-free on the hot path.
/// All counters only move forward between explicit resets.
#[derive(Debug)]
pub(crate) struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
    evictions_lru: AtomicU64,
    evictions_fifo: AtomicU64,
    evictions_random: AtomicU64,
    expired_removed: AtomicU64,
    cleanup_cycles: AtomicU64,
    /// Milliseconds since epoch of the last reaper cycle; zero if none.
    last_cleanup_ms: AtomicI64,
    created_at_ms: AtomicI64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            clears: AtomicU64::new(0),
            evictions_lru: AtomicU64::new(0),
            evictions_fifo: AtomicU64::new(0),
            evictions_random: AtomicU64::new(0),
            expired_removed: AtomicU64::new(0),
            cleanup_cycles: AtomicU64::new(0),
            last_cleanup_ms: AtomicI64::new(0),
            created_at_ms: AtomicI64::new(now_millis()),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, policy: EvictionPolicy) {
        let counter = match policy {
            EvictionPolicy::Lru => &self.evictions_lru,
            EvictionPolicy::Fifo => &self.evictions_fifo,
            EvictionPolicy::Random => &self.evictions_random,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.expired_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cleanup_cycle(&self) {
        self.cleanup_cycles.fetch_add(1, Ordering::Relaxed);
        self.last_cleanup_ms.store(now_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last_cleanup = self.last_cleanup_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            evictions_lru: self.evictions_lru.load(Ordering::Relaxed),
            evictions_fifo: self.evictions_fifo.load(Ordering::Relaxed),
            evictions_random: self.evictions_random.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            cleanup_cycles: self.cleanup_cycles.load(Ordering::Relaxed),
            last_cleanup_ms: (last_cleanup != 0).then_some(last_cleanup),
            created_at_ms: self.created_at_ms.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter, clear the last-cleanup mark, and restart the
    /// observation window at the current time.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
        self.evictions_lru.store(0, Ordering::Relaxed);
        self.evictions_fifo.store(0, Ordering::Relaxed);
        self.evictions_random.store(0, Ordering::Relaxed);
        self.expired_removed.store(0, Ordering::Relaxed);
        self.cleanup_cycles.store(0, Ordering::Relaxed);
        self.last_cleanup_ms.store(0, Ordering::Relaxed);
        self.created_at_ms.store(now_millis(), Ordering::Relaxed);
    }
}

/// A point-in-time copy of the cache counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub deletes: u64,
    pub clears: u64,
    pub evictions_lru: u64,
    pub evictions_fifo: u64,
    pub evictions_random: u64,
    pub expired_removed: u64,
    pub cleanup_cycles: u64,
    pub last_cleanup_ms: Option<i64>,
    pub created_at_ms: i64,
}

impl StatsSnapshot {
    /// Hit percentage over all lookups, or zero with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 * 100.0 / lookups as f64
    }

    /// Render the counters for operator inspection.
    pub fn to_formatted(&self) -> String {
        let n = |v: u64| v.to_formatted_string(&Locale::en);
        let last_cleanup = match self.last_cleanup_ms {
            Some(ms) => format!("{}ms", ms.to_formatted_string(&Locale::en)),
            None => "never".to_string(),
        };
        format!(
            "cache statistics (since epoch-ms {created}):\n\
             \x20 hits:              {hits}\n\
             \x20 misses:            {misses}\n\
             \x20 hit rate:          {rate:.2}%\n\
             \x20 puts:              {puts}\n\
             \x20 deletes:           {deletes}\n\
             \x20 clears:            {clears}\n\
             \x20 evictions LRU:     {lru}\n\
             \x20 evictions FIFO:    {fifo}\n\
             \x20 evictions RANDOM:  {random}\n\
             \x20 expired removed:   {expired}\n\
             \x20 cleanup cycles:    {cycles}\n\
             \x20 last cleanup:      {last_cleanup}",
            created = self.created_at_ms.to_formatted_string(&Locale::en),
            hits = n(self.hits),
            misses = n(self.misses),
            rate = self.hit_rate(),
            puts = n(self.puts),
            deletes = n(self.deletes),
            clears = n(self.clears),
            lru = n(self.evictions_lru),
            fifo = n(self.evictions_fifo),
            random = n(self.evictions_random),
            expired = n(self.expired_removed),
            cycles = n(self.cleanup_cycles),
            last_cleanup = last_cleanup,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_put();
        stats.record_eviction(EvictionPolicy::Fifo);
        stats.record_expired(3);
        stats.record_cleanup_cycle();

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.puts, 1);
        assert_eq!(snap.evictions_fifo, 1);
        assert_eq!(snap.expired_removed, 3);
        assert_eq!(snap.cleanup_cycles, 1);
        assert!(snap.last_cleanup_ms.is_some());

        let before_reset = snap.created_at_ms;
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.evictions_fifo, 0);
        assert_eq!(snap.last_cleanup_ms, None);
        assert!(snap.created_at_ms >= before_reset);
    }

    #[test]
    fn hit_rate_renders_two_decimals() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let snap = stats.snapshot();
        assert!((snap.hit_rate() - 66.666).abs() < 0.01);
        assert!(snap.to_formatted().contains("66.67%"));
    }

    #[test]
    fn formatted_output_separates_thousands() {
        let stats = CacheStats::new();
        for _ in 0..1_500 {
            stats.record_put();
        }
        assert!(stats.snapshot().to_formatted().contains("1,500"));
    }
}
