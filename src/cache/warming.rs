//! Proactive cache warming.
//!
//! Unlike a passive prefetch queue, the warming manager drives its own
//! writes: it pulls a batch of candidate keys from an external
//! [`WarmingDataSource`], writes them into a target [`StorageCache`] at
//! `High` priority, and reports completion over the same event bus the
//! manager uses for observability.

use crate::cache::entry::EntryPriority;
use crate::cache::events::CacheEvent;
use crate::cache::StorageCache;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Predicate a `Custom` warming strategy uses to pick candidates out of
/// whatever a data source's `custom` fetch returns.
pub type WarmingPredicate<K, V> = Arc<dyn Fn(&K, &V) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum WarmingStrategy<K, V> {
    MostAccessed,
    MostRecent,
    Custom(WarmingPredicate<K, V>),
}

impl<K, V> fmt::Debug for WarmingStrategy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarmingStrategy::MostAccessed => write!(f, "MostAccessed"),
            WarmingStrategy::MostRecent => write!(f, "MostRecent"),
            WarmingStrategy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// External source of candidate keys/values to warm, owned by the
/// caller (typically backed by whatever persistent catalog the embedded
/// store already has, outside this crate's scope).
#[async_trait]
pub trait WarmingDataSource<K, V>: Send + Sync {
    async fn most_accessed(&self, limit: usize) -> Result<Vec<(K, V)>>;
    async fn most_recent(&self, limit: usize) -> Result<Vec<(K, V)>>;
    async fn custom(&self, limit: usize, predicate: &WarmingPredicate<K, V>) -> Result<Vec<(K, V)>>;
}

#[derive(Clone)]
pub struct WarmingConfig<K, V> {
    pub strategy: WarmingStrategy<K, V>,
    pub batch_size: usize,
    pub max_entries: usize,
    pub max_warming_time: Duration,
    pub inter_batch_delay: Duration,
    pub periodic_interval: Option<Duration>,
}

impl<K, V> Default for WarmingConfig<K, V> {
    fn default() -> Self {
        Self {
            strategy: WarmingStrategy::MostAccessed,
            batch_size: 100,
            max_entries: 10_000,
            max_warming_time: Duration::from_secs(30),
            inter_batch_delay: Duration::from_millis(0),
            periodic_interval: None,
        }
    }
}

#[derive(Debug, Default)]
struct WarmingCounters {
    warmed: AtomicU64,
    total: AtomicU64,
}

/// Drives a single warming run at a time; a second call while one is in
/// flight is rejected rather than interleaved.
pub struct WarmingManager<K, V> {
    config: WarmingConfig<K, V>,
    source: Arc<dyn WarmingDataSource<K, V>>,
    is_warming: AtomicBool,
    counters: WarmingCounters,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl<K, V> WarmingManager<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + ToString + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: WarmingConfig<K, V>, source: Arc<dyn WarmingDataSource<K, V>>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            source,
            is_warming: AtomicBool::new(false),
            counters: WarmingCounters::default(),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_warming(&self) -> bool {
        self.is_warming.load(Ordering::Relaxed)
    }

    pub fn warmed_count(&self) -> u64 {
        self.counters.warmed.load(Ordering::Relaxed)
    }

    /// Runs one warming pass against `target`, bounded by
    /// `max_warming_time` or `cancel`, whichever fires first.
    pub async fn run(
        &self,
        target: &dyn StorageCache<K, V>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self
            .is_warming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let outcome = self.run_inner(target, cancel).await;
        self.is_warming.store(false, Ordering::Relaxed);
        outcome
    }

    async fn run_inner(
        &self,
        target: &dyn StorageCache<K, V>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let started = Instant::now();
        let deadline = tokio::time::sleep(self.config.max_warming_time);
        tokio::pin!(deadline);

        let mut warmed = 0u64;
        let mut total = 0u64;
        let mut offset = 0usize;

        loop {
            if total as usize >= self.config.max_entries {
                break;
            }
            let remaining = self.config.max_entries - total as usize;
            let batch_size = self.config.batch_size.min(remaining);

            let fetch = self.fetch_batch(batch_size, offset);
            let batch = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = self.event_tx.send(CacheEvent::WarmingCancelled { reason: "cancelled".into() });
                    return Ok(());
                }
                _ = &mut deadline => {
                    let _ = self.event_tx.send(CacheEvent::WarmingCancelled { reason: "deadline exceeded".into() });
                    break;
                }
                result = fetch => result?,
            };

            if batch.is_empty() {
                break;
            }
            offset += batch.len();
            for (key, value) in batch {
                total += 1;
                match target.put_with_priority(key, value, EntryPriority::High).await {
                    Ok(()) => warmed += 1,
                    Err(e) => {
                        let _ = self
                            .event_tx
                            .send(CacheEvent::WarmingFailed { reason: e.to_string() });
                    }
                }
            }
            if !self.config.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        self.counters.warmed.fetch_add(warmed, Ordering::Relaxed);
        self.counters.total.fetch_add(total, Ordering::Relaxed);
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(warmed, total, duration_ms, "warming run complete");
        let _ = self.event_tx.send(CacheEvent::WarmingCompleted {
            warmed,
            total,
            duration_ms,
        });
        Ok(())
    }

    async fn fetch_batch(&self, limit: usize, _offset: usize) -> Result<Vec<(K, V)>> {
        match &self.config.strategy {
            WarmingStrategy::MostAccessed => self.source.most_accessed(limit).await,
            WarmingStrategy::MostRecent => self.source.most_recent(limit).await,
            WarmingStrategy::Custom(predicate) => self.source.custom(limit, predicate).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::eviction::LruPolicy;
    use crate::cache::manager::{MultiLevelCache, MultiLevelCacheConfiguration};
    use crate::cache::storage::{InMemoryCache, MemoryCacheConfig};
    use crate::cache::DefaultSizer;
    use std::sync::Mutex;

    struct FixedSource {
        items: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl WarmingDataSource<String, String> for FixedSource {
        async fn most_accessed(&self, limit: usize) -> Result<Vec<(String, String)>> {
            let mut items = self.items.lock().unwrap();
            let take = items.len().min(limit);
            let drained: Vec<_> = items.drain(..take).collect();
            Ok(drained)
        }
        async fn most_recent(&self, limit: usize) -> Result<Vec<(String, String)>> {
            self.most_accessed(limit).await
        }
        async fn custom(
            &self,
            limit: usize,
            predicate: &WarmingPredicate<String, String>,
        ) -> Result<Vec<(String, String)>> {
            let all = self.most_accessed(usize::MAX).await?;
            Ok(all.into_iter().filter(|(k, v)| predicate(k, v)).take(limit).collect())
        }
    }

    fn cache() -> MultiLevelCache<String, String> {
        let l1 = Arc::new(InMemoryCache::new(
            "l1",
            MemoryCacheConfig::default(),
            Arc::new(LruPolicy::default()),
            Arc::new(DefaultSizer),
        ));
        MultiLevelCache::new("ml", l1, None, MultiLevelCacheConfiguration::default())
    }

    #[tokio::test]
    async fn warming_run_writes_all_items() {
        let source = Arc::new(FixedSource {
            items: Mutex::new(vec![("a".into(), "1".into()), ("b".into(), "2".into())]),
        });
        let mgr = WarmingManager::new(WarmingConfig::default(), source);
        let cache = cache();
        mgr.run(&cache, CancellationToken::new()).await.unwrap();
        assert_eq!(mgr.warmed_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected_not_interleaved() {
        let source = Arc::new(FixedSource { items: Mutex::new(vec![]) });
        let mgr = WarmingManager::new(WarmingConfig::default(), source);
        mgr.is_warming.store(true, Ordering::SeqCst);
        let cache = cache();
        mgr.run(&cache, CancellationToken::new()).await.unwrap();
        assert_eq!(mgr.warmed_count(), 0);
    }

    #[tokio::test]
    async fn custom_strategy_applies_predicate() {
        let source = Arc::new(FixedSource {
            items: Mutex::new(vec![
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
                ("c".into(), "3".into()),
            ]),
        });
        let predicate: WarmingPredicate<String, String> = Arc::new(|k: &String, _v: &String| k.as_str() != "b");
        let config = WarmingConfig {
            strategy: WarmingStrategy::Custom(predicate),
            ..WarmingConfig::default()
        };
        let mgr = WarmingManager::new(config, source);
        let cache = cache();
        mgr.run(&cache, CancellationToken::new()).await.unwrap();
        assert_eq!(mgr.warmed_count(), 2);
    }
}
