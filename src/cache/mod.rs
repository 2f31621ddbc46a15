//! Multi-tier caching subsystem.
//!
//! - **L1 Memory** ([`storage::InMemoryCache`]): hot data, DashMap-backed.
//! - **L2 Disk** ([`storage::DiskCache`]): warm data, one SHA-256-named
//!   file per entry, optionally GZip-compressed.
//!
//! The two tiers are composed by [`manager::MultiLevelCache`], which
//! implements [`StorageCache`] — the trait every caller-facing consumer
//! (warming, coherence, storage integration) programs against.

pub mod codec;
pub mod coherence;
pub mod compression;
pub mod entry;
pub mod events;
pub mod eviction;
pub mod integration;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod tier;
pub mod warming;

pub use entry::{CacheEntry, DefaultSizer, EntryMetadata, EntryPriority, Sizer};
pub use eviction::EvictionPolicy;
pub use manager::{MultiLevelCache, MultiLevelCacheConfiguration};
pub use metrics::{CacheStatistics, MultiLevelStatistics, StatisticsSnapshot};
pub use tier::CacheTier;

use crate::error::Result;
use async_trait::async_trait;
use std::hash::Hash;
use tokio_util::sync::CancellationToken;

/// The full public surface a caller programs against, implemented by
/// [`manager::MultiLevelCache`].
///
/// Every operation has a synchronous-looking name (`get`, `put`, ...)
/// and an async-cancellable counterpart (`get_async`, `put_async`, ...)
/// that accepts a [`CancellationToken`]; both forms share the same
/// underlying implementation, since the tiers themselves are async.
#[async_trait]
pub trait StorageCache<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<V>>;
    async fn get_async(&self, key: &K, cancel: CancellationToken) -> Result<Option<V>>;
    async fn get_many(&self, keys: &[K]) -> Result<Vec<(K, V)>>;

    async fn put(&self, key: K, value: V) -> Result<()>;
    async fn put_with_priority(&self, key: K, value: V, priority: EntryPriority) -> Result<()>;
    async fn put_many(&self, entries: Vec<(K, V)>) -> Result<()>;
    async fn put_if_absent(&self, key: K, value: V) -> Result<bool>;

    async fn remove(&self, key: &K) -> Result<bool>;
    async fn remove_many(&self, keys: &[K]) -> Result<u64>;

    async fn contains_key(&self, key: &K) -> bool;
    fn keys(&self) -> Vec<K>;

    async fn clear(&self) -> Result<()>;
    async fn clear_expired(&self) -> Result<u64>;
    async fn evict(&self, bytes_needed: usize) -> Result<u64>;

    fn get_entry_metadata(&self, key: &K) -> Option<EntryMetadata>;

    fn name(&self) -> &str;
    fn count(&self) -> u64;
    fn size_bytes(&self) -> u64;
    fn hit_ratio(&self) -> f64;
    fn statistics(&self) -> &MultiLevelStatistics;

    async fn dispose(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    #[test]
    fn module_compiles() {
        // placeholder: substantive tests live alongside each component.
    }
}
