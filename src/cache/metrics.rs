//! Cache statistics.
//!
//! Counters are cache-line aligned to avoid false sharing between
//! readers and writers hammering the same tier from different cores.

use crate::cache::tier::CacheTier;
use std::sync::atomic::{AtomicU64, Ordering};

const CACHE_LINE_SIZE: usize = 64;

/// Atomic counters for one tier. `total_access_ms` accumulates wall-clock
/// time spent servicing get operations (hit or miss) so callers can
/// derive an average.
#[repr(C, align(64))]
pub struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
    entries_added: AtomicU64,
    entries_removed: AtomicU64,
    current_size_bytes: AtomicU64,
    current_count: AtomicU64,
    total_access_micros: AtomicU64,
    _padding: [u8; CACHE_LINE_SIZE],
}

const _: () = assert!(std::mem::size_of::<CacheStatistics>() % CACHE_LINE_SIZE == 0);

impl Default for CacheStatistics {
    fn default() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            entries_added: AtomicU64::new(0),
            entries_removed: AtomicU64::new(0),
            current_size_bytes: AtomicU64::new(0),
            current_count: AtomicU64::new(0),
            total_access_micros: AtomicU64::new(0),
            _padding: [0; CACHE_LINE_SIZE],
        }
    }
}

impl CacheStatistics {
    pub fn record_hit(&self, elapsed: std::time::Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_access_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_miss(&self, elapsed: std::time::Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.total_access_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, size_bytes: u64) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.record_remove(size_bytes);
    }

    pub fn record_expired(&self, size_bytes: u64) {
        self.expired.fetch_add(1, Ordering::Relaxed);
        self.record_remove(size_bytes);
    }

    pub fn record_add(&self, size_bytes: u64) {
        self.entries_added.fetch_add(1, Ordering::Relaxed);
        self.current_count.fetch_add(1, Ordering::Relaxed);
        self.current_size_bytes
            .fetch_add(size_bytes, Ordering::Relaxed);
    }

    pub fn record_remove(&self, size_bytes: u64) {
        self.entries_removed.fetch_add(1, Ordering::Relaxed);
        self.current_count.fetch_sub(1, Ordering::Relaxed);
        self.current_size_bytes
            .fetch_sub(size_bytes, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn current_count(&self) -> u64 {
        self.current_count.load(Ordering::Relaxed)
    }

    pub fn current_size_bytes(&self) -> u64 {
        self.current_size_bytes.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.hits.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn average_access_micros(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.total_access_micros.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Resets hit/miss/eviction/expiry/timing counters; current
    /// size/count are left intact since they describe live state, not
    /// accumulated history.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expired.store(0, Ordering::Relaxed);
        self.entries_added.store(0, Ordering::Relaxed);
        self.entries_removed.store(0, Ordering::Relaxed);
        self.total_access_micros.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            entries_added: self.entries_added.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
            current_size_bytes: self.current_size_bytes(),
            current_count: self.current_count(),
            hit_ratio: self.hit_ratio(),
            average_access_micros: self.average_access_micros(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub entries_added: u64,
    pub entries_removed: u64,
    pub current_size_bytes: u64,
    pub current_count: u64,
    pub hit_ratio: f64,
    pub average_access_micros: f64,
}

/// Statistics for both tiers of a [`crate::cache::manager::MultiLevelCache`].
pub struct MultiLevelStatistics {
    pub l1: CacheStatistics,
    pub l2: CacheStatistics,
}

impl Default for MultiLevelStatistics {
    fn default() -> Self {
        Self {
            l1: CacheStatistics::default(),
            l2: CacheStatistics::default(),
        }
    }
}

impl MultiLevelStatistics {
    pub fn tier(&self, tier: CacheTier) -> &CacheStatistics {
        match tier {
            CacheTier::L1Memory => &self.l1,
            CacheTier::L2Disk => &self.l2,
        }
    }

    /// Overall hit ratio counts an L1 hit as a hit; an L2 hit (L1 miss,
    /// L2 hit) still counts as a hit; only an L2 miss counts as a miss.
    pub fn overall_hit_ratio(&self) -> f64 {
        let hits = self.l1.hits.load(Ordering::Relaxed) + self.l2.hits.load(Ordering::Relaxed);
        let misses = self.l2.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}
