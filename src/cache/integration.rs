//! Storage-engine integration layer.
//!
//! Owns one [`MultiLevelCache`] per (channel, cache type, key type,
//! value type) combination, named by the scheme
//! `channel_{id}_{cache_type}_{key_type}_{value_type}`, and runs a
//! periodic maintenance task (`clear_expired` then conditional `evict`)
//! across all of them.

use crate::cache::entry::DefaultSizer;
use crate::cache::eviction::LruPolicy;
use crate::cache::manager::{MultiLevelCache, MultiLevelCacheConfiguration};
use crate::cache::storage::{DiskCache, DiskCacheConfig, InMemoryCache, MemoryCacheConfig};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Entity,
    TypeMetadata,
    FileData,
}

impl CacheKind {
    fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Entity => "entity",
            CacheKind::TypeMetadata => "type_metadata",
            CacheKind::FileData => "file_data",
        }
    }
}

fn registry_key(channel_id: &str, kind: CacheKind, key_type: &str, value_type: &str) -> String {
    format!("channel_{channel_id}_{}_{key_type}_{value_type}", kind.as_str())
}

/// Object-safe maintenance surface, implemented for every concrete
/// `MultiLevelCache<K, V>` regardless of its `K`/`V`. The registry keeps
/// this alongside the type-erased `Any` handle so `spawn_maintenance`
/// can drive a real sweep across every registered cache without knowing
/// any of their concrete types.
#[async_trait]
pub trait MaintainableCache: Send + Sync {
    async fn run_maintenance(&self) -> Result<(u64, u64)>;
    fn name(&self) -> &str;
}

#[async_trait]
impl<K, V> MaintainableCache for MultiLevelCache<K, V>
where
    K: Eq + std::hash::Hash + Clone + Send + Sync + ToString + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn run_maintenance(&self) -> Result<(u64, u64)> {
        MultiLevelCache::run_maintenance(self).await
    }

    fn name(&self) -> &str {
        crate::cache::StorageCache::name(self)
    }
}

/// Type-erased handle stored in the registry, paired with an
/// object-safe maintenance handle so a type-erased sweep can still
/// invoke the cache's real `clear_expired`/`evict`/promotion/demotion.
struct RegisteredCache {
    any: Arc<dyn Any + Send + Sync>,
    maintain: Arc<dyn MaintainableCache>,
}

pub struct StorageCacheIntegration {
    caches: RwLock<HashMap<String, RegisteredCache>>,
    l2_root: std::path::PathBuf,
    maintenance_interval: Duration,
}

impl StorageCacheIntegration {
    pub fn new(l2_root: impl Into<std::path::PathBuf>, maintenance_interval: Duration) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            l2_root: l2_root.into(),
            maintenance_interval,
        }
    }

    /// Returns the cache for `(channel_id, kind)`, constructing it with
    /// an L1-only default configuration on first use if it does not
    /// already exist.
    pub async fn get_or_create_cache<K, V>(
        &self,
        channel_id: &str,
        kind: CacheKind,
    ) -> Result<Arc<MultiLevelCache<K, V>>>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + ToString + 'static,
        V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        let key_type = std::any::type_name::<K>();
        let value_type = std::any::type_name::<V>();
        let name = registry_key(channel_id, kind, key_type, value_type);

        if let Some(existing) = self.caches.read().get(&name) {
            if let Ok(cache) = existing.any.clone().downcast::<MultiLevelCache<K, V>>() {
                return Ok(cache);
            }
            warn!(name, "registry entry type mismatch, recreating");
        }

        let l1 = Arc::new(InMemoryCache::new(
            name.clone(),
            MemoryCacheConfig::default(),
            Arc::new(LruPolicy::default()),
            Arc::new(DefaultSizer),
        ));
        let l2_path = self.l2_root.join(&name);
        let l2 = Arc::new(
            DiskCache::open(
                DiskCacheConfig {
                    root_path: l2_path,
                    ..Default::default()
                },
                Arc::new(crate::cache::codec::JsonCodec::new()),
            )
            .await?,
        );
        let cache = Arc::new(MultiLevelCache::new(
            name.clone(),
            l1,
            Some(l2),
            MultiLevelCacheConfiguration::default(),
        ));
        self.caches.write().insert(
            name,
            RegisteredCache {
                any: cache.clone(),
                maintain: cache.clone(),
            },
        );
        Ok(cache)
    }

    pub async fn entity_cache<K, V>(&self, channel_id: &str) -> Result<Arc<MultiLevelCache<K, V>>>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + ToString + 'static,
        V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        self.get_or_create_cache(channel_id, CacheKind::Entity).await
    }

    pub async fn type_metadata_cache<K, V>(&self, channel_id: &str) -> Result<Arc<MultiLevelCache<K, V>>>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + ToString + 'static,
        V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        self.get_or_create_cache(channel_id, CacheKind::TypeMetadata).await
    }

    pub async fn file_data_cache<K, V>(&self, channel_id: &str) -> Result<Arc<MultiLevelCache<K, V>>>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + ToString + 'static,
        V: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        self.get_or_create_cache(channel_id, CacheKind::FileData).await
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Runs one maintenance sweep across every registered cache right
    /// now, returning the aggregate `(expired, evicted)` across all of
    /// them. `spawn_maintenance` calls this on a timer; exposed directly
    /// so a caller can also trigger an out-of-band sweep (e.g. before a
    /// graceful shutdown).
    pub async fn run_maintenance_once(&self) -> (u64, u64) {
        let handles: Vec<Arc<dyn MaintainableCache>> =
            self.caches.read().values().map(|c| c.maintain.clone()).collect();
        let mut total_expired = 0u64;
        let mut total_evicted = 0u64;
        for handle in handles {
            match handle.run_maintenance().await {
                Ok((expired, evicted)) => {
                    total_expired += expired;
                    total_evicted += evicted;
                    debug!(cache = handle.name(), expired, evicted, "maintenance pass complete");
                }
                Err(e) => warn!(cache = handle.name(), error = %e, "maintenance pass failed"),
            }
        }
        (total_expired, total_evicted)
    }

    /// Spawns the periodic maintenance loop. Returns a handle the caller
    /// can abort on shutdown.
    pub fn spawn_maintenance(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.maintenance_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let (expired, evicted) = self.run_maintenance_once().await;
                debug!(
                    caches = self.registered_names().len(),
                    expired, evicted, "maintenance sweep complete"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StorageCache;

    #[tokio::test]
    async fn get_or_create_returns_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let integration = StorageCacheIntegration::new(dir.path(), Duration::from_secs(60));
        let a = integration
            .entity_cache::<String, String>("ch1")
            .await
            .unwrap();
        let b = integration
            .entity_cache::<String, String>("ch1")
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_kinds_are_distinct_caches() {
        let dir = tempfile::tempdir().unwrap();
        let integration = StorageCacheIntegration::new(dir.path(), Duration::from_secs(60));
        let entity = integration.entity_cache::<String, String>("ch1").await.unwrap();
        let files = integration.file_data_cache::<String, String>("ch1").await.unwrap();
        entity.put("k".into(), "v".into()).await.unwrap();
        assert_eq!(files.get(&"k".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn registry_key_includes_channel_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let integration = StorageCacheIntegration::new(dir.path(), Duration::from_secs(60));
        integration.entity_cache::<String, String>("ch42").await.unwrap();
        let names = integration.registered_names();
        assert!(names.iter().any(|n| n.contains("channel_ch42_entity")));
    }

    #[tokio::test]
    async fn maintenance_sweep_expires_entries() {
        let dir = tempfile::tempdir().unwrap();
        let integration = StorageCacheIntegration::new(dir.path(), Duration::from_secs(60));
        let cache = integration.entity_cache::<String, String>("ch1").await.unwrap();
        cache.l1.put_sync(
            "k".to_string(),
            "v".to_string(),
            crate::cache::EntryPriority::Normal,
            Some(Duration::from_millis(0)),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (expired, _evicted) = integration.run_maintenance_once().await;
        assert_eq!(expired, 1);
    }
}
