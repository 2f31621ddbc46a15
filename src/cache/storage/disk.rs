//! L2 disk tier: one file per entry, named by the SHA-256 hex digest of
//! the entry's key, optionally GZip-compressed. Concurrency into the
//! directory is bounded by a semaphore so a burst of concurrent misses
//! cannot flood the filesystem with simultaneous opens.
//!
//! Any failure reading, decompressing, or decoding a file back
//! (truncated write, bit rot, a format change) is treated as tier
//! corruption: the index entry is dropped and the read reports a miss
//! rather than propagating the error, matching the in-memory tier's
//! "a failed lookup is a miss, not an error" contract.

use crate::cache::codec::ValueCodec;
use crate::cache::compression::CompressionManager;
use crate::cache::entry::{EntryMetadata, EntryPriority};
use crate::cache::storage::TierStorage;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct OnDiskEntry {
    key_display: String,
    priority: u8,
    compressed: bool,
    created_at_ms: i64,
    ttl_ms: Option<i64>,
    body: Vec<u8>,
}

fn priority_to_u8(p: EntryPriority) -> u8 {
    match p {
        EntryPriority::Low => 0,
        EntryPriority::Normal => 1,
        EntryPriority::High => 2,
        EntryPriority::NeverEvict => 3,
    }
}

fn priority_from_u8(v: u8) -> EntryPriority {
    match v {
        0 => EntryPriority::Low,
        2 => EntryPriority::High,
        3 => EntryPriority::NeverEvict,
        _ => EntryPriority::Normal,
    }
}

#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    pub root_path: PathBuf,
    pub max_size_bytes: u64,
    pub compression_enabled: bool,
    pub compression_level: u32,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("./cache-data"),
            max_size_bytes: 10 * 1024 * 1024 * 1024,
            compression_enabled: true,
            compression_level: 6,
        }
    }
}

/// An L2 entry's index record: where its file lives, how large it is,
/// and the same access bookkeeping `CacheEntry` keeps for L1, kept in
/// memory so hot-path accounting never touches disk.
struct IndexEntry {
    path: PathBuf,
    size_bytes: u64,
    priority: EntryPriority,
    created_at_ms: i64,
    last_accessed_at_ms: AtomicI64,
    access_count: AtomicU64,
    ttl_ms: Option<i64>,
}

impl IndexEntry {
    fn is_expired(&self) -> bool {
        match self.ttl_ms {
            Some(ttl_ms) => Utc::now().timestamp_millis() - self.created_at_ms >= ttl_ms,
            None => false,
        }
    }

    fn record_access(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.last_accessed_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

pub struct DiskCache<K, V> {
    config: DiskCacheConfig,
    index: RwLock<HashMap<K, IndexEntry>>,
    size_bytes: AtomicU64,
    gate: Semaphore,
    codec: Arc<dyn ValueCodec<V>>,
    compression: CompressionManager,
}

fn hash_key(key_display: &str) -> String {
    let digest = Sha256::digest(key_display.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl<K, V> DiskCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + ToString + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Opens (creating if absent) the cache directory. Per the disk
    /// index's documented startup behavior, this sums file sizes on disk
    /// but does not reconstruct the key→file index: keys are stored only
    /// as one-way SHA-256 digests in the filename, so there is no way to
    /// recover the original key from a file left over from a prior
    /// process. Orphaned files age out through the normal expiry sweep
    /// once a caller re-populates the index by writing the same key again.
    pub async fn open(config: DiskCacheConfig, codec: Arc<dyn ValueCodec<V>>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.root_path).await?;
        let mut total_bytes = 0u64;
        let mut reader = tokio::fs::read_dir(&config.root_path).await?;
        while let Some(entry) = reader.next_entry().await? {
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() {
                    total_bytes += meta.len();
                }
            }
        }
        info!(
            path = %config.root_path.display(),
            bytes_on_disk = total_bytes,
            "opened disk tier (index not reconstructed, keys are one-way hashed)"
        );
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let compression = CompressionManager::new(crate::cache::compression::CompressionConfig {
            enabled: config.compression_enabled,
            level: config.compression_level,
            min_size_bytes: 1024,
        });
        Ok(Self {
            config,
            index: RwLock::new(HashMap::new()),
            size_bytes: AtomicU64::new(total_bytes),
            gate: Semaphore::new(num_cpus * 2),
            codec,
            compression,
        })
    }

    fn file_path(&self, key: &K) -> PathBuf {
        let display = key.to_string();
        let filename = format!("{}.cache", hash_key(&display));
        self.config.root_path.join(filename)
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.gate
            .acquire()
            .await
            .map_err(|_| Error::ConcurrencyExhausted)
    }

    /// Drops an index entry treated as unreadable (I/O failure,
    /// corruption, a missing file) and reconciles the size accounting.
    fn evict_corrupted(&self, key: &K, path: &std::path::Path, reason: &str) {
        warn!(path = %path.display(), reason, "disk entry unreadable, evicting index entry");
        if let Some(entry) = self.index.write().remove(key) {
            self.size_bytes.fetch_sub(entry.size_bytes, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl<K, V> TierStorage<K, V> for DiskCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + ToString + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        let (path, expired) = {
            let index = self.index.read();
            match index.get(key) {
                Some(e) => (e.path.clone(), e.is_expired()),
                None => return Ok(None),
            }
        };
        if expired {
            self.remove(key).await?;
            return Ok(None);
        }

        let _permit = self.acquire().await?;
        let raw = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.evict_corrupted(key, &path, &e.to_string());
                return Ok(None);
            }
        };
        let on_disk: OnDiskEntry = match serde_json::from_slice(&raw) {
            Ok(v) => v,
            Err(e) => {
                self.evict_corrupted(key, &path, &e.to_string());
                return Ok(None);
            }
        };
        let body = match self.compression.decompress(&on_disk.body, on_disk.compressed) {
            Ok(b) => b,
            Err(e) => {
                self.evict_corrupted(key, &path, &e.to_string());
                return Ok(None);
            }
        };
        let value = match self.codec.decode(&body) {
            Ok(v) => v,
            Err(e) => {
                self.evict_corrupted(key, &path, &e.to_string());
                return Ok(None);
            }
        };
        if let Some(entry) = self.index.read().get(key) {
            entry.record_access();
        }
        debug!(path = %path.display(), "disk tier hit");
        Ok(Some(value))
    }

    async fn put(&self, key: K, value: V, priority: EntryPriority, ttl: Option<Duration>) -> Result<()> {
        let _permit = self.acquire().await?;
        let path = self.file_path(&key);
        let plain = self.codec.encode(&value)?;
        let (body, compressed) = self.compression.compress(&plain);
        let created_at_ms = Utc::now().timestamp_millis();
        let ttl_ms = ttl.map(|d| d.as_millis() as i64);
        let record = OnDiskEntry {
            key_display: key.to_string(),
            priority: priority_to_u8(priority),
            compressed,
            created_at_ms,
            ttl_ms,
            body,
        };
        let serialized =
            serde_json::to_vec(&record).map_err(|e| Error::Codec(e.to_string()))?;
        tokio::fs::write(&path, &serialized).await?;
        let size_bytes = serialized.len() as u64;

        let previous = self.index.write().insert(
            key,
            IndexEntry {
                path,
                size_bytes,
                priority,
                created_at_ms,
                last_accessed_at_ms: AtomicI64::new(created_at_ms),
                access_count: AtomicU64::new(0),
                ttl_ms,
            },
        );
        if let Some(prev) = previous {
            self.size_bytes.fetch_sub(prev.size_bytes, Ordering::Relaxed);
        }
        self.size_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        Ok(())
    }

    async fn remove(&self, key: &K) -> Result<bool> {
        let removed = self.index.write().remove(key);
        match removed {
            Some(entry) => {
                let _permit = self.acquire().await?;
                let _ = tokio::fs::remove_file(&entry.path).await;
                self.size_bytes.fetch_sub(entry.size_bytes, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn contains_key(&self, key: &K) -> bool {
        self.index.read().contains_key(key)
    }

    fn keys(&self) -> Vec<K> {
        self.index.read().keys().cloned().collect()
    }

    async fn clear(&self) -> Result<()> {
        let entries: Vec<PathBuf> = {
            let mut index = self.index.write();
            let paths = index.values().map(|e| e.path.clone()).collect();
            index.clear();
            paths
        };
        for path in entries {
            let _ = tokio::fs::remove_file(&path).await;
        }
        self.size_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn clear_expired(&self) -> Result<u64> {
        let expired_keys: Vec<K> = {
            let index = self.index.read();
            index
                .iter()
                .filter(|(_, e)| e.is_expired())
                .map(|(k, _)| k.clone())
                .collect()
        };
        let mut count = 0u64;
        for key in expired_keys {
            if self.remove(&key).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    fn count(&self) -> u64 {
        self.index.read().len() as u64
    }

    fn entry_metadata(&self, key: &K) -> Option<EntryMetadata> {
        self.index.read().get(key).map(|e| EntryMetadata {
            size_bytes: e.size_bytes as usize,
            priority: e.priority,
            access_count: e.access_count.load(Ordering::Relaxed),
            created_at: DateTime::from_timestamp_millis(e.created_at_ms).unwrap_or_else(Utc::now),
            last_accessed_at: DateTime::from_timestamp_millis(e.last_accessed_at_ms.load(Ordering::Relaxed))
                .unwrap_or_else(Utc::now),
            dirty: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec::JsonCodec;

    async fn cache(dir: &std::path::Path) -> DiskCache<String, String> {
        let config = DiskCacheConfig {
            root_path: dir.to_path_buf(),
            ..Default::default()
        };
        DiskCache::open(config, Arc::new(JsonCodec::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path()).await;
        c.put("a".to_string(), "value".to_string(), EntryPriority::Normal, None)
            .await
            .unwrap();
        assert_eq!(c.get(&"a".to_string()).await.unwrap(), Some("value".to_string()));
    }

    #[tokio::test]
    async fn filename_is_sha256_hex_of_key() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path()).await;
        c.put("a".to_string(), "v".to_string(), EntryPriority::Normal, None)
            .await
            .unwrap();
        let expected = hash_key("a");
        assert!(dir.path().join(format!("{expected}.cache")).exists());
    }

    #[tokio::test]
    async fn remove_deletes_file_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path()).await;
        c.put("a".to_string(), "v".to_string(), EntryPriority::Normal, None)
            .await
            .unwrap();
        assert!(c.remove(&"a".to_string()).await.unwrap());
        assert_eq!(c.get(&"a".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn restart_does_not_reconstruct_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let c = cache(dir.path()).await;
            c.put("a".to_string(), "v".to_string(), EntryPriority::Normal, None)
                .await
                .unwrap();
        }
        let reopened = cache(dir.path()).await;
        // bytes on disk are accounted...
        assert!(reopened.size_bytes() > 0);
        // ...but the key→file index is empty, so the key is unreachable
        // until the caller writes it again.
        assert_eq!(reopened.get(&"a".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn priority_and_access_count_round_trip_through_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path()).await;
        c.put("a".to_string(), "v".to_string(), EntryPriority::High, None)
            .await
            .unwrap();
        c.get(&"a".to_string()).await.unwrap();
        c.get(&"a".to_string()).await.unwrap();
        let meta = c.entry_metadata(&"a".to_string()).unwrap();
        assert_eq!(meta.priority, EntryPriority::High);
        assert_eq!(meta.access_count, 2);
    }

    #[tokio::test]
    async fn clear_expired_sweeps_ttl_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path()).await;
        c.put(
            "expires".to_string(),
            "v".to_string(),
            EntryPriority::Normal,
            Some(Duration::from_millis(0)),
        )
        .await
        .unwrap();
        c.put("stays".to_string(), "v".to_string(), EntryPriority::Normal, None)
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(c.clear_expired().await.unwrap(), 1);
        assert_eq!(c.get(&"expires".to_string()).await.unwrap(), None);
        assert_eq!(c.get(&"stays".to_string()).await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn corrupted_file_is_a_miss_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path()).await;
        c.put("a".to_string(), "v".to_string(), EntryPriority::Normal, None)
            .await
            .unwrap();
        let path = c.index.read().get(&"a".to_string()).unwrap().path.clone();
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert_eq!(c.get(&"a".to_string()).await.unwrap(), None);
        assert!(!c.contains_key(&"a".to_string()).await);
    }

    #[test]
    fn priority_round_trips_through_u8() {
        for p in [
            EntryPriority::Low,
            EntryPriority::Normal,
            EntryPriority::High,
            EntryPriority::NeverEvict,
        ] {
            assert_eq!(priority_from_u8(priority_to_u8(p)), p);
        }
    }
}
