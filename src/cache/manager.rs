//! Two-tier composer: probes L1 then L2, promotes on L2 hit, and
//! decides write placement by write-through flag / priority threshold
//! rather than by object size.

use crate::cache::coherence::{CoherenceManager, CoherenceOperation};
use crate::cache::entry::{EntryMetadata, EntryPriority};
use crate::cache::events::CacheEvent;
use crate::cache::metrics::MultiLevelStatistics;
use crate::cache::storage::{DiskCache, DiskCacheConfig, InMemoryCache, MemoryCacheConfig, TierStorage};
use crate::cache::tier::CacheTier;
use crate::cache::StorageCache;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct MultiLevelCacheConfiguration {
    pub l1: MemoryCacheConfig,
    pub l2_enabled: bool,
    pub l2: DiskCacheConfig,
    /// Every write also goes to L2, regardless of priority.
    pub write_through: bool,
    /// Entries at or above this priority are written to L2 even when
    /// `write_through` is false.
    pub l2_write_threshold: EntryPriority,
    /// Promote an L2 hit into L1 only at or above this priority.
    pub l1_promote_threshold: EntryPriority,
    pub event_channel_capacity: usize,
    pub auto_promote: bool,
    pub auto_promote_batch_size: usize,
    /// Promote an L2-resident key only once it has been accessed (via
    /// `run_auto_promotion`'s own bookkeeping, not a one-off `get`) at
    /// least this many times since it last landed in L2.
    pub promotion_threshold: u64,
    /// How often `spawn_auto_promotion`'s background task runs a pass.
    pub promotion_interval: std::time::Duration,
    pub demotion_age_threshold: std::time::Duration,
    pub l1_utilization_threshold: f64,
    pub auto_demote: bool,
}

impl Default for MultiLevelCacheConfiguration {
    fn default() -> Self {
        Self {
            l1: MemoryCacheConfig::default(),
            l2_enabled: true,
            l2: DiskCacheConfig::default(),
            write_through: false,
            l2_write_threshold: EntryPriority::High,
            l1_promote_threshold: EntryPriority::Normal,
            event_channel_capacity: 256,
            auto_promote: false,
            auto_promote_batch_size: 64,
            promotion_threshold: 3,
            promotion_interval: std::time::Duration::from_secs(60),
            demotion_age_threshold: std::time::Duration::from_secs(300),
            l1_utilization_threshold: 0.85,
            auto_demote: false,
        }
    }
}

pub struct MultiLevelCache<K, V> {
    name: String,
    pub(crate) l1: Arc<InMemoryCache<K, V>>,
    pub(crate) l2: Option<Arc<DiskCache<K, V>>>,
    config: MultiLevelCacheConfiguration,
    stats: MultiLevelStatistics,
    event_tx: broadcast::Sender<CacheEvent>,
    coherence: Option<Arc<CoherenceManager<K, V>>>,
    disposed: AtomicBool,
}

impl<K, V> MultiLevelCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + ToString + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        l1: Arc<InMemoryCache<K, V>>,
        l2: Option<Arc<DiskCache<K, V>>>,
        config: MultiLevelCacheConfiguration,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            name: name.into(),
            l1,
            l2,
            config,
            stats: MultiLevelStatistics::default(),
            event_tx,
            coherence: None,
            disposed: AtomicBool::new(false),
        }
    }

    /// Attaches a coherence manager. Writes, removals, and clears
    /// originating on this cache are announced to its registered peers
    /// under this cache's own name, so a coherence manager shared across
    /// several `MultiLevelCache`s never echoes a write back to its
    /// origin.
    pub fn with_coherence(mut self, coherence: Arc<CoherenceManager<K, V>>) -> Self {
        self.coherence = Some(coherence);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        let _ = self.event_tx.send(event);
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::Relaxed) {
            return Err(Error::Disposed(self.name.clone()));
        }
        Ok(())
    }

    fn should_write_l2(&self, priority: EntryPriority) -> bool {
        self.config.l2_enabled && (self.config.write_through || priority >= self.config.l2_write_threshold)
    }

    async fn notify_coherence(&self, op: CoherenceOperation<K, V>) {
        if let Some(coherence) = &self.coherence {
            if let Err(e) = coherence.notify(&self.name, op).await {
                tracing::warn!(cache = %self.name, error = %e, "coherence notify failed");
            }
        }
    }

    async fn get_inner(&self, key: &K) -> Result<Option<V>> {
        let started = Instant::now();
        if let Some(v) = self.l1.get(key).await? {
            self.stats.l1.record_hit(started.elapsed());
            self.emit(CacheEvent::hit(key.to_string(), CacheTier::L1Memory));
            return Ok(Some(v));
        }
        self.stats.l1.record_miss(started.elapsed());

        let Some(l2) = &self.l2 else {
            self.emit(CacheEvent::miss(key.to_string()));
            return Ok(None);
        };
        let l2_started = Instant::now();
        match l2.get(key).await? {
            Some(v) => {
                self.stats.l2.record_hit(l2_started.elapsed());
                self.emit(CacheEvent::hit(key.to_string(), CacheTier::L2Disk));
                if self.config.l1_promote_threshold <= EntryPriority::High {
                    self.l1.put_sync(key.clone(), v.clone(), EntryPriority::High, None);
                    self.emit(CacheEvent::promote(key.to_string(), CacheTier::L2Disk, CacheTier::L1Memory));
                }
                Ok(Some(v))
            }
            None => {
                self.stats.l2.record_miss(l2_started.elapsed());
                self.emit(CacheEvent::miss(key.to_string()));
                Ok(None)
            }
        }
    }

    async fn put_inner(&self, key: K, value: V, priority: EntryPriority) -> Result<()> {
        self.l1.put_sync(key.clone(), value.clone(), priority, None);
        self.emit(CacheEvent::put(key.to_string(), CacheTier::L1Memory));
        if self.should_write_l2(priority) {
            if let Some(l2) = &self.l2 {
                l2.put(key.clone(), value.clone(), priority, None).await?;
                self.emit(CacheEvent::put(key.to_string(), CacheTier::L2Disk));
            }
        }
        self.notify_coherence(CoherenceOperation::Put { key, value, priority }).await;
        Ok(())
    }

    /// Evicts `bytes_needed` bytes, L1 first: drops roughly half the
    /// shortfall from L1, then covers the remainder from L2. This is a
    /// conservative estimate, not an exact accounting, since the two
    /// tiers may hold different entries of different sizes for the
    /// "same" logical key set.
    pub async fn evict_bytes(&self, bytes_needed: usize) -> Result<u64> {
        let l1_target = bytes_needed / 2;
        let l1_evicted = self.l1.evict_bytes(l1_target);
        let remainder = bytes_needed.saturating_sub(l1_target);
        let mut l2_evicted = 0u64;
        if remainder > 0 {
            if let Some(l2) = &self.l2 {
                // L2 has no eviction policy of its own (Open Question:
                // the disk tier never reconstructs an LRU order across
                // restarts); fall back to dropping arbitrary index
                // entries until the remainder is covered.
                let mut freed = 0usize;
                for key in l2.keys() {
                    if freed >= remainder {
                        break;
                    }
                    if let Some(meta) = l2.entry_metadata(&key) {
                        freed += meta.size_bytes;
                    }
                    if l2.remove(&key).await? {
                        l2_evicted += 1;
                    }
                }
            }
        }
        Ok(l1_evicted + l2_evicted)
    }

    /// Demotes aged, over-threshold L1 entries to L2. Entries are always
    /// ensured present in L2 before being dropped from L1, so enabling
    /// demotion can never silently lose data.
    pub async fn run_auto_demotion(&self) -> Result<u64> {
        if !self.config.auto_demote {
            return Ok(0);
        }
        let utilization = self.l1.size_bytes() as f64 / self.l1.max_size_bytes().max(1) as f64;
        if utilization < self.config.l1_utilization_threshold {
            return Ok(0);
        }
        let mut demoted = 0u64;
        for key in self.l1.keys() {
            let Some(meta) = self.l1.entry_metadata(&key) else {
                continue;
            };
            if meta.priority == EntryPriority::NeverEvict {
                continue;
            }
            let age = chrono::Utc::now().signed_duration_since(meta.created_at);
            let Ok(age_std) = age.to_std() else { continue };
            if age_std < self.config.demotion_age_threshold {
                continue;
            }
            if let Some(value) = self.l1.get(&key).await? {
                if let Some(l2) = &self.l2 {
                    l2.put(key.clone(), value, meta.priority, None).await?;
                }
                self.l1.remove(&key).await?;
                self.emit(CacheEvent::demote(key.to_string(), CacheTier::L1Memory, CacheTier::L2Disk));
                demoted += 1;
            }
        }
        debug!(demoted, "auto-demotion pass complete");
        Ok(demoted)
    }

    /// Promotes L2-resident entries accessed at least `promotion_threshold`
    /// times into L1, at `High` priority since surviving that many L2
    /// round trips marks a key as hot.
    pub async fn run_auto_promotion(&self) -> Result<u64> {
        if !self.config.auto_promote {
            return Ok(0);
        }
        let Some(l2) = &self.l2 else { return Ok(0) };
        let mut promoted = 0u64;
        for key in l2.keys().into_iter().take(self.config.auto_promote_batch_size) {
            if self.l1.contains_key(&key).await {
                continue;
            }
            let Some(meta) = l2.entry_metadata(&key) else {
                continue;
            };
            if meta.access_count < self.config.promotion_threshold {
                continue;
            }
            if let Some(value) = l2.get(&key).await? {
                self.l1.put_sync(key.clone(), value, EntryPriority::High, None);
                self.emit(CacheEvent::promote(key.to_string(), CacheTier::L2Disk, CacheTier::L1Memory));
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    /// Runs one full maintenance sweep: expire, then demote/promote,
    /// then evict if L1 is still over its watermark. Returns
    /// `(expired, evicted)`, with promotions/demotions folded into
    /// `evicted`'s companion event stream rather than the return value,
    /// since they move bytes between tiers rather than freeing them.
    pub async fn run_maintenance(&self) -> Result<(u64, u64)> {
        self.check_disposed()?;
        let mut expired = self.l1.clear_expired_sync();
        if let Some(l2) = &self.l2 {
            expired += l2.clear_expired().await?;
        }
        self.run_auto_promotion().await?;
        self.run_auto_demotion().await?;
        let evicted = if self.l1.size_bytes() as f64 / self.l1.max_size_bytes().max(1) as f64
            >= self.l1.eviction_threshold()
        {
            self.l1.evict_to_watermark()
        } else {
            0
        };
        Ok((expired, evicted))
    }

    /// Spawns a background task that runs [`Self::run_auto_promotion`]
    /// on `promotion_interval`. Returns a handle the caller can abort on
    /// shutdown; the cache itself does not own the task since it is not
    /// `'static` without the `Arc` wrapper.
    pub fn spawn_auto_promotion(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        let interval = cache.config.promotion_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if cache.check_disposed().is_err() {
                    break;
                }
                match cache.run_auto_promotion().await {
                    Ok(promoted) if promoted > 0 => debug!(promoted, "auto-promotion pass complete"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "auto-promotion pass failed"),
                }
            }
        })
    }
}

#[async_trait]
impl<K, V> StorageCache<K, V> for MultiLevelCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + ToString + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        self.check_disposed()?;
        self.get_inner(key).await
    }

    async fn get_async(&self, key: &K, cancel: CancellationToken) -> Result<Option<V>> {
        self.check_disposed()?;
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.get_inner(key) => result,
        }
    }

    async fn get_many(&self, keys: &[K]) -> Result<Vec<(K, V)>> {
        self.check_disposed()?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(v) = self.get_inner(key).await? {
                out.push((key.clone(), v));
            }
        }
        Ok(out)
    }

    async fn put(&self, key: K, value: V) -> Result<()> {
        self.check_disposed()?;
        self.put_inner(key, value, EntryPriority::default()).await
    }

    async fn put_with_priority(&self, key: K, value: V, priority: EntryPriority) -> Result<()> {
        self.check_disposed()?;
        self.put_inner(key, value, priority).await
    }

    async fn put_many(&self, entries: Vec<(K, V)>) -> Result<()> {
        self.check_disposed()?;
        for (key, value) in entries {
            self.put_inner(key, value, EntryPriority::default()).await?;
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: K, value: V) -> Result<bool> {
        self.check_disposed()?;
        if self.contains_key(&key).await {
            return Ok(false);
        }
        self.put_inner(key, value, EntryPriority::default()).await?;
        Ok(true)
    }

    async fn remove(&self, key: &K) -> Result<bool> {
        self.check_disposed()?;
        let l1_removed = self.l1.remove(key).await?;
        let l2_removed = if let Some(l2) = &self.l2 {
            l2.remove(key).await?
        } else {
            false
        };
        if l1_removed || l2_removed {
            self.emit(CacheEvent::Delete { key: key.to_string() });
            self.notify_coherence(CoherenceOperation::Remove { key: key.clone() }).await;
        }
        Ok(l1_removed || l2_removed)
    }

    async fn remove_many(&self, keys: &[K]) -> Result<u64> {
        self.check_disposed()?;
        let mut count = 0u64;
        for key in keys {
            if self.remove(key).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn contains_key(&self, key: &K) -> bool {
        if self.l1.contains_key(key).await {
            return true;
        }
        match &self.l2 {
            Some(l2) => l2.contains_key(key).await,
            None => false,
        }
    }

    fn keys(&self) -> Vec<K> {
        let mut keys = self.l1.keys();
        if let Some(l2) = &self.l2 {
            for key in l2.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    async fn clear(&self) -> Result<()> {
        self.check_disposed()?;
        self.l1.clear().await?;
        if let Some(l2) = &self.l2 {
            l2.clear().await?;
        }
        self.emit(CacheEvent::TierCleared { tier: CacheTier::L1Memory });
        self.notify_coherence(CoherenceOperation::Clear).await;
        Ok(())
    }

    async fn clear_expired(&self) -> Result<u64> {
        self.check_disposed()?;
        let mut count = self.l1.clear_expired().await?;
        if let Some(l2) = &self.l2 {
            count += l2.clear_expired().await?;
        }
        Ok(count)
    }

    async fn evict(&self, bytes_needed: usize) -> Result<u64> {
        self.check_disposed()?;
        self.evict_bytes(bytes_needed).await
    }

    fn get_entry_metadata(&self, key: &K) -> Option<EntryMetadata> {
        self.l1
            .entry_metadata(key)
            .or_else(|| self.l2.as_ref().and_then(|l2| l2.entry_metadata(key)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self) -> u64 {
        self.l1.count() + self.l2.as_ref().map(|l2| l2.count()).unwrap_or(0)
    }

    fn size_bytes(&self) -> u64 {
        self.l1.size_bytes() + self.l2.as_ref().map(|l2| l2.size_bytes()).unwrap_or(0)
    }

    fn hit_ratio(&self) -> f64 {
        self.stats.overall_hit_ratio()
    }

    fn statistics(&self) -> &MultiLevelStatistics {
        &self.stats
    }

    async fn dispose(&self) -> Result<()> {
        self.disposed.store(true, Ordering::Relaxed);
        info!(cache = %self.name, "cache disposed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::coherence::CoherenceStrategy;
    use crate::cache::entry::DefaultSizer;
    use crate::cache::eviction::LruPolicy;

    async fn build_cache(dir: &std::path::Path) -> MultiLevelCache<String, String> {
        let l1 = Arc::new(InMemoryCache::new(
            "l1",
            MemoryCacheConfig::default(),
            Arc::new(LruPolicy::default()),
            Arc::new(DefaultSizer),
        ));
        let l2 = Arc::new(
            DiskCache::open(
                DiskCacheConfig {
                    root_path: dir.to_path_buf(),
                    ..Default::default()
                },
                Arc::new(crate::cache::codec::JsonCodec::new()),
            )
            .await
            .unwrap(),
        );
        let config = MultiLevelCacheConfiguration {
            write_through: true,
            ..Default::default()
        };
        MultiLevelCache::new("ml", l1, Some(l2), config)
    }

    #[tokio::test]
    async fn write_through_lands_in_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = build_cache(dir.path()).await;
        cache.put("a".to_string(), "1".to_string()).await.unwrap();
        assert_eq!(cache.get(&"a".to_string()).await.unwrap(), Some("1".to_string()));
        assert!(cache.l1.contains_key(&"a".to_string()).await);
    }

    #[tokio::test]
    async fn l2_hit_promotes_to_l1_at_high_priority() {
        let dir = tempfile::tempdir().unwrap();
        let cache = build_cache(dir.path()).await;
        cache
            .l2
            .as_ref()
            .unwrap()
            .put("a".to_string(), "1".to_string(), EntryPriority::Normal, None)
            .await
            .unwrap();
        assert!(!cache.l1.contains_key(&"a".to_string()).await);
        let v = cache.get(&"a".to_string()).await.unwrap();
        assert_eq!(v, Some("1".to_string()));
        assert!(cache.l1.contains_key(&"a".to_string()).await);
        let meta = cache.l1.entry_metadata(&"a".to_string()).unwrap();
        assert_eq!(meta.priority, EntryPriority::High);
    }

    #[tokio::test]
    async fn disposed_cache_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let cache = build_cache(dir.path()).await;
        cache.dispose().await.unwrap();
        assert!(cache.get(&"a".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_get_async() {
        let dir = tempfile::tempdir().unwrap();
        let cache = build_cache(dir.path()).await;
        let token = CancellationToken::new();
        token.cancel();
        let result = cache.get_async(&"a".to_string(), token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn auto_promotion_respects_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let l1 = Arc::new(InMemoryCache::new(
            "l1",
            MemoryCacheConfig::default(),
            Arc::new(LruPolicy::default()),
            Arc::new(DefaultSizer),
        ));
        let l2 = Arc::new(
            DiskCache::open(
                DiskCacheConfig {
                    root_path: dir.path().to_path_buf(),
                    ..Default::default()
                },
                Arc::new(crate::cache::codec::JsonCodec::new()),
            )
            .await
            .unwrap(),
        );
        l2.put("a".to_string(), "1".to_string(), EntryPriority::Normal, None)
            .await
            .unwrap();
        let config = MultiLevelCacheConfiguration {
            auto_promote: true,
            promotion_threshold: 2,
            ..Default::default()
        };
        let cache = MultiLevelCache::new("ml", l1, Some(l2), config);
        assert_eq!(cache.run_auto_promotion().await.unwrap(), 0);
        cache.l2.as_ref().unwrap().get(&"a".to_string()).await.unwrap();
        cache.l2.as_ref().unwrap().get(&"a".to_string()).await.unwrap();
        assert_eq!(cache.run_auto_promotion().await.unwrap(), 1);
        assert!(cache.l1.contains_key(&"a".to_string()).await);
    }

    #[tokio::test]
    async fn put_notifies_coherence_peers_except_origin() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let coherence = Arc::new(CoherenceManager::new(CoherenceStrategy::WriteThrough));

        let a = Arc::new(build_cache(dir_a.path()).await);
        let b = Arc::new(build_cache(dir_b.path()).await);
        coherence.register("a", &(a.clone() as Arc<dyn StorageCache<String, String>>));
        coherence.register("b", &(b.clone() as Arc<dyn StorageCache<String, String>>));

        let a_with_coherence = MultiLevelCache::new(
            "a",
            a.l1.clone(),
            a.l2.clone(),
            MultiLevelCacheConfiguration {
                write_through: true,
                ..Default::default()
            },
        )
        .with_coherence(coherence.clone());

        a_with_coherence.put("k".to_string(), "v".to_string()).await.unwrap();
        assert_eq!(b.get(&"k".to_string()).await.unwrap(), Some("v".to_string()));
    }
}
