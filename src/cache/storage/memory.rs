//! L1 in-memory tier: a `DashMap` of entries plus an eviction policy,
//! guarded against concurrent eviction passes by a `parking_lot::RwLock`
//! critical section. Normal reads/writes go straight to the map and
//! never take that lock.

use crate::cache::entry::{CacheEntry, EntryMetadata, EntryPriority, Sizer};
use crate::cache::eviction::{EvictionCandidate, EvictionPolicy};
use crate::cache::metrics::CacheStatistics;
use crate::cache::storage::TierStorage;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    pub max_capacity: usize,
    pub max_size_bytes: u64,
    /// Ratio of capacity (by count or by bytes) that triggers an
    /// eviction pass. Must be greater than `eviction_target`.
    pub eviction_threshold: f64,
    /// Ratio an eviction pass reduces usage back down to.
    pub eviction_target: f64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            max_size_bytes: 256 * 1024 * 1024,
            eviction_threshold: 0.9,
            eviction_target: 0.8,
        }
    }
}

pub struct InMemoryCache<K, V> {
    name: String,
    entries: DashMap<K, CacheEntry<K, V>>,
    eviction_lock: RwLock<()>,
    policy: Arc<dyn EvictionPolicy<K>>,
    sizer: Arc<dyn Sizer<K, V>>,
    config: MemoryCacheConfig,
    size_bytes: AtomicU64,
    stats: CacheStatistics,
}

impl<K, V> InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        config: MemoryCacheConfig,
        policy: Arc<dyn EvictionPolicy<K>>,
        sizer: Arc<dyn Sizer<K, V>>,
    ) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            eviction_lock: RwLock::new(()),
            policy,
            sizer,
            config,
            size_bytes: AtomicU64::new(0),
            stats: CacheStatistics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statistics(&self) -> &CacheStatistics {
        &self.stats
    }

    pub fn max_capacity(&self) -> usize {
        self.config.max_capacity
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.config.max_size_bytes
    }

    pub fn eviction_threshold(&self) -> f64 {
        self.config.eviction_threshold
    }

    pub fn try_get(&self, key: &K) -> Option<V> {
        let started = Instant::now();
        let entry = self.entries.get(key);
        match entry {
            Some(e) if e.is_expired() => {
                drop(e);
                self.remove_sync(key);
                self.stats.record_miss(started.elapsed());
                None
            }
            Some(e) => {
                e.record_access();
                self.stats.record_hit(started.elapsed());
                Some(e.value.clone())
            }
            None => {
                self.stats.record_miss(started.elapsed());
                None
            }
        }
    }

    pub fn put_sync(&self, key: K, value: V, priority: EntryPriority, ttl: Option<Duration>) {
        let size_bytes = self.sizer.size_of_key(&key)
            + self.sizer.size_of_value(&value)
            + self.sizer.entry_overhead();
        let mut entry = CacheEntry::new(key.clone(), value, size_bytes).with_priority(priority);
        if let Some(ttl) = ttl {
            entry = entry.with_ttl(ttl);
        }
        if let Some(old) = self.entries.insert(key, entry) {
            self.size_bytes
                .fetch_sub(old.size_bytes as u64, Ordering::Relaxed);
            self.stats.record_remove(old.size_bytes as u64);
        }
        self.size_bytes
            .fetch_add(size_bytes as u64, Ordering::Relaxed);
        self.stats.record_add(size_bytes as u64);

        if self.should_evict() {
            self.evict_to_watermark();
        }
    }

    pub fn put_if_absent_sync(&self, key: K, value: V, priority: EntryPriority) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.put_sync(key, value, priority, None);
        true
    }

    fn should_evict(&self) -> bool {
        let count_ratio = self.entries.len() as f64 / self.config.max_capacity.max(1) as f64;
        let bytes_ratio =
            self.size_bytes.load(Ordering::Relaxed) as f64 / self.config.max_size_bytes.max(1) as f64;
        count_ratio >= self.config.eviction_threshold || bytes_ratio >= self.config.eviction_threshold
    }

    fn remove_sync(&self, key: &K) -> bool {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.size_bytes
                .fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
            self.stats.record_remove(entry.size_bytes as u64);
            true
        } else {
            false
        }
    }

    fn snapshot_candidates(&self) -> Vec<EvictionCandidate<K>> {
        self.entries
            .iter()
            .map(|e| EvictionCandidate {
                key: e.key().clone(),
                size_bytes: e.size_bytes,
                created_at: e.created_at,
                last_accessed_at: e.last_accessed_at(),
                access_count: e.access_count(),
                priority: e.priority,
                expired: e.is_expired(),
            })
            .collect()
    }

    fn evict_targets(&self, target_count: usize, target_bytes: u64) -> u64 {
        let _guard = self.eviction_lock.write();
        let current_count = self.entries.len();
        let current_bytes = self.size_bytes.load(Ordering::Relaxed);
        if current_count <= target_count && current_bytes <= target_bytes {
            return 0;
        }
        let candidates = self.snapshot_candidates();
        let victims = self.policy.select_for_eviction(
            &candidates,
            current_count,
            current_bytes as usize,
            target_count,
            target_bytes as usize,
        );
        let mut evicted = 0u64;
        for key in victims {
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.size_bytes
                    .fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
                self.stats.record_eviction(entry.size_bytes as u64);
                evicted += 1;
            }
        }
        evicted
    }

    /// Evicts down from `eviction_threshold` to `eviction_target`, on both
    /// count and bytes. Takes the eviction lock so a second thread hitting
    /// the threshold concurrently waits instead of racing a duplicate pass.
    pub fn evict_to_watermark(&self) -> u64 {
        let target_count = (self.config.max_capacity as f64 * self.config.eviction_target) as usize;
        let target_bytes = (self.config.max_size_bytes as f64 * self.config.eviction_target) as u64;
        let evicted = self.evict_targets(target_count, target_bytes);
        debug!(evicted, "L1 eviction pass complete");
        evicted
    }

    /// Evicts at least `bytes_needed` bytes, regardless of the configured
    /// watermark, for callers (the two-tier composer's `evict`) that need
    /// an explicit byte target rather than the tier's own threshold.
    pub fn evict_bytes(&self, bytes_needed: usize) -> u64 {
        let current_bytes = self.size_bytes.load(Ordering::Relaxed);
        let target_bytes = current_bytes.saturating_sub(bytes_needed as u64);
        // target_count of 0 means count never stops this pass early; only
        // the explicit byte target (or running out of evictable entries)
        // does.
        self.evict_targets(0, target_bytes)
    }

    pub fn clear_sync(&self) {
        self.entries.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
    }

    pub fn clear_expired_sync(&self) -> u64 {
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|e| e.is_expired())
            .map(|e| e.key().clone())
            .collect();
        let mut count = 0u64;
        for key in expired_keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.size_bytes
                    .fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
                self.stats.record_expired(entry.size_bytes as u64);
                count += 1;
            }
        }
        count
    }
}

#[async_trait]
impl<K, V> TierStorage<K, V> for InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.try_get(key))
    }

    async fn put(&self, key: K, value: V, priority: EntryPriority, ttl: Option<Duration>) -> Result<()> {
        self.put_sync(key, value, priority, ttl);
        Ok(())
    }

    async fn remove(&self, key: &K) -> Result<bool> {
        Ok(self.remove_sync(key))
    }

    async fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key) && !self.try_expired(key)
    }

    fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    async fn clear(&self) -> Result<()> {
        self.clear_sync();
        Ok(())
    }

    async fn clear_expired(&self) -> Result<u64> {
        Ok(self.clear_expired_sync())
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    fn count(&self) -> u64 {
        self.entries.len() as u64
    }

    fn entry_metadata(&self, key: &K) -> Option<EntryMetadata> {
        self.entries.get(key).map(|e| EntryMetadata::from(&*e))
    }
}

impl<K, V> InMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn try_expired(&self, key: &K) -> bool {
        self.entries.get(key).map(|e| e.is_expired()).unwrap_or(true)
    }
}
