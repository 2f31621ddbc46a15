//! Per-tier storage backends.

mod disk;
mod memory;

pub use disk::{DiskCache, DiskCacheConfig};
pub use memory::{InMemoryCache, MemoryCacheConfig};

use crate::cache::entry::{EntryMetadata, EntryPriority};
use crate::error::Result;
use async_trait::async_trait;
use std::hash::Hash;
use std::time::Duration;

/// Capability set shared by both tiers of storage. `MultiLevelCache`
/// composes two `TierStorage` implementations rather than knowing their
/// concrete types.
#[async_trait]
pub trait TierStorage<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<V>>;
    async fn put(&self, key: K, value: V, priority: EntryPriority, ttl: Option<Duration>) -> Result<()>;
    async fn remove(&self, key: &K) -> Result<bool>;
    async fn contains_key(&self, key: &K) -> bool;
    fn keys(&self) -> Vec<K>;
    async fn clear(&self) -> Result<()>;
    async fn clear_expired(&self) -> Result<u64>;
    fn size_bytes(&self) -> u64;
    fn count(&self) -> u64;
    fn entry_metadata(&self, key: &K) -> Option<EntryMetadata>;
}
