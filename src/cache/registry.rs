//! Named-cache factory and registry.

use crate::cache::entry::DefaultSizer;
use crate::cache::eviction::{EvictionPolicy, LfuPolicy, LruPolicy, TimeBasedPolicy};
use crate::cache::manager::{MultiLevelCache, MultiLevelCacheConfiguration};
use crate::cache::storage::{InMemoryCache, MemoryCacheConfig};
use crate::cache::StorageCache;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

/// Selects which eviction policy a registry-created L1 tier uses.
/// `Custom` takes any other policy the caller already has wired up
/// (composed via another example's registry, or hand-built for a
/// domain-specific ordering this crate doesn't ship).
pub enum PolicyKind<K> {
    Lru,
    Lfu,
    TimeBased,
    Custom(Arc<dyn EvictionPolicy<K>>),
}

impl<K> Default for PolicyKind<K> {
    fn default() -> Self {
        PolicyKind::Lru
    }
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> PolicyKind<K> {
    fn build(self) -> Arc<dyn EvictionPolicy<K>> {
        match self {
            PolicyKind::Lru => Arc::new(LruPolicy::default()),
            PolicyKind::Lfu => Arc::new(LfuPolicy::default()),
            PolicyKind::TimeBased => Arc::new(TimeBasedPolicy::default()),
            PolicyKind::Custom(policy) => policy,
        }
    }
}

/// Maps cache names to type-erased `StorageCache` handles. One registry
/// instance can back any number of distinct `K`/`V` pairs as long as
/// callers keep their own type discipline about which name holds which
/// concrete types (mirrored by [`crate::cache::integration::StorageCacheIntegration`]'s
/// keying scheme).
pub struct CacheRegistry<K, V> {
    caches: RwLock<HashMap<String, Arc<dyn StorageCache<K, V>>>>,
}

impl<K, V> Default for CacheRegistry<K, V> {
    fn default() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> CacheRegistry<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + ToString + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_in_memory(
        &self,
        name: impl Into<String>,
        capacity: MemoryCacheConfig,
        policy: PolicyKind<K>,
    ) -> Result<Arc<dyn StorageCache<K, V>>> {
        let name = name.into();
        if self.caches.read().contains_key(&name) {
            return Err(Error::DuplicateCacheName(name));
        }
        let l1 = Arc::new(InMemoryCache::new(
            name.clone(),
            capacity,
            policy.build(),
            Arc::new(DefaultSizer),
        ));
        let cache: Arc<dyn StorageCache<K, V>> = Arc::new(MultiLevelCache::new(
            name.clone(),
            l1,
            None,
            MultiLevelCacheConfiguration::default(),
        ));
        self.caches.write().insert(name, cache.clone());
        Ok(cache)
    }

    pub fn register(&self, name: impl Into<String>, cache: Arc<dyn StorageCache<K, V>>) -> Result<()> {
        let name = name.into();
        let mut caches = self.caches.write();
        if caches.contains_key(&name) {
            return Err(Error::DuplicateCacheName(name));
        }
        caches.insert(name, cache);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StorageCache<K, V>>> {
        self.caches.read().get(name).cloned()
    }

    pub fn get_or_create(
        &self,
        name: impl Into<String>,
        capacity: MemoryCacheConfig,
        policy: PolicyKind<K>,
    ) -> Result<Arc<dyn StorageCache<K, V>>> {
        let name = name.into();
        if let Some(existing) = self.get(&name) {
            return Ok(existing);
        }
        self.create_in_memory(name, capacity, policy)
    }

    /// Removes and disposes the named cache, so in-flight operations
    /// against it start failing with `Error::Disposed` rather than
    /// silently operating on an orphaned instance some other `Arc`
    /// clone still holds.
    pub async fn remove(&self, name: &str) -> Option<Arc<dyn StorageCache<K, V>>> {
        let removed = self.caches.write().remove(name);
        if let Some(cache) = &removed {
            let _ = cache.dispose().await;
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.caches.read().len()
    }
}

/// Process-wide convenience singleton for `String`-keyed, `String`-valued
/// caches; callers with other key/value types construct their own
/// `CacheRegistry` directly rather than going through this.
static GLOBAL_REGISTRY: OnceLock<CacheRegistry<String, String>> = OnceLock::new();

pub fn global_registry() -> &'static CacheRegistry<String, String> {
    GLOBAL_REGISTRY.get_or_init(CacheRegistry::default)
}
