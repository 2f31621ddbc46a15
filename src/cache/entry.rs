//! Cache entries, priorities, and the pluggable size-estimation heuristic
//! used to account for them against tier capacity.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Eviction priority hint carried on every entry.
///
/// `NeverEvict` is a promise, not a guarantee: a policy that is asked to
/// make room and finds nothing else eligible may still have to fall
/// back to it rather than reject the write outright — see each
/// `EvictionPolicy` implementation for its own rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EntryPriority {
    Low,
    #[default]
    Normal,
    High,
    NeverEvict,
}

/// Pluggable byte-size estimator for keys and values.
///
/// Implementations need not be exact; tier capacity accounting is a
/// budget, not an allocator, so consistency matters more than precision.
pub trait Sizer<K, V>: Send + Sync {
    fn size_of_key(&self, key: &K) -> usize;
    fn size_of_value(&self, value: &V) -> usize;

    /// Fixed bookkeeping overhead charged per entry on top of key/value size.
    fn entry_overhead(&self) -> usize {
        128
    }
}

/// Conservative fallback sizer: flat per-key/per-value estimates.
///
/// Used when the caller does not know (or does not care) about the
/// shape of `K`/`V`. Callers whose keys/values are strings or raw bytes
/// get tighter estimates from [`StringSizer`] or [`BytesSizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSizer;

const FALLBACK_KEY_SIZE: usize = 64;
const FALLBACK_VALUE_SIZE: usize = 256;
const FALLBACK_OVERHEAD: usize = 128;

impl<K, V> Sizer<K, V> for DefaultSizer {
    fn size_of_key(&self, _key: &K) -> usize {
        FALLBACK_KEY_SIZE
    }

    fn size_of_value(&self, _value: &V) -> usize {
        FALLBACK_VALUE_SIZE
    }

    fn entry_overhead(&self) -> usize {
        FALLBACK_OVERHEAD
    }
}

/// Sizer for `String` keys paired with `String` values: charges 2 bytes
/// per character on both sides, matching UTF-16-ish worst case rather
/// than counting raw UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSizer;

impl Sizer<String, String> for StringSizer {
    fn size_of_key(&self, key: &String) -> usize {
        key.chars().count() * 2
    }

    fn size_of_value(&self, value: &String) -> usize {
        value.chars().count() * 2
    }
}

/// Sizer for `String` keys paired with raw byte values (`Vec<u8>` or
/// `bytes::Bytes`): charges the exact byte length on the value side.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSizer;

impl Sizer<String, Vec<u8>> for BytesSizer {
    fn size_of_key(&self, key: &String) -> usize {
        key.chars().count() * 2
    }

    fn size_of_value(&self, value: &Vec<u8>) -> usize {
        value.len()
    }
}

impl Sizer<String, bytes::Bytes> for BytesSizer {
    fn size_of_key(&self, key: &String) -> usize {
        key.chars().count() * 2
    }

    fn size_of_value(&self, value: &bytes::Bytes) -> usize {
        value.len()
    }
}

/// A single cached value plus the bookkeeping metadata the eviction
/// policies and statistics layer need.
///
/// Generic over the caller's key type only insofar as the key itself is
/// stored alongside the value for disk-tier round trips; lookups are
/// always keyed externally by the owning map.
#[derive(Debug)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub priority: EntryPriority,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    last_accessed_at: AtomicI64,
    access_count: AtomicU64,
    pub ttl: Option<std::time::Duration>,
    pub dirty: bool,
}

impl<K: Clone, V: Clone> Clone for CacheEntry<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            priority: self.priority,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
            last_accessed_at: AtomicI64::new(self.last_accessed_at.load(Ordering::Relaxed)),
            access_count: AtomicU64::new(self.access_count.load(Ordering::Relaxed)),
            ttl: self.ttl,
            dirty: self.dirty,
        }
    }
}

impl<K: Clone, V> CacheEntry<K, V> {
    pub fn new(key: K, value: V, size_bytes: usize) -> Self {
        let now = Utc::now();
        Self {
            key,
            value,
            priority: EntryPriority::default(),
            size_bytes,
            created_at: now,
            last_modified_at: now,
            last_accessed_at: AtomicI64::new(now.timestamp_millis()),
            access_count: AtomicU64::new(0),
            ttl: None,
            dirty: false,
        }
    }

    pub fn with_priority(mut self, priority: EntryPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    /// Marks this entry accessed, bumping `access_count` and
    /// `last_accessed_at`. Called on every hit by every tier.
    pub fn record_access(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.last_accessed_at
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_accessed_at.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(self.created_at);
                age.to_std().map(|a| a >= ttl).unwrap_or(false)
            }
            None => false,
        }
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    pub fn idle_time(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.last_accessed_at())
    }
}

/// Lightweight metadata snapshot for an entry, returned by
/// `get_entry_metadata` without cloning the value itself.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub size_bytes: usize,
    pub priority: EntryPriority,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub dirty: bool,
}

impl<K: Clone, V> From<&CacheEntry<K, V>> for EntryMetadata {
    fn from(entry: &CacheEntry<K, V>) -> Self {
        Self {
            size_bytes: entry.size_bytes,
            priority: entry.priority,
            access_count: entry.access_count(),
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at(),
            dirty: entry.dirty,
        }
    }
}
