//! tiercache — composable, thread-safe, two-tier cache for an embedded
//! object-storage engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    StorageCacheIntegration (C10)                 │
//! │        per-channel, per-type MultiLevelCache registry            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   CacheRegistry (C9)  │  CoherenceManager (C7) │ WarmingManager  │
//! │   named cache factory │  peer write propagation│ (C8) preload    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                   MultiLevelCache<K, V> (C6)                     │
//! │        probes L1, falls through to L2, promotes on hit           │
//! ├───────────────────────────┬───────────────────────────────────-─┤
//! │   InMemoryCache<K, V> (C4)│        DiskCache<K, V> (C5)          │
//! │   DashMap + eviction lock │  SHA-256-named files, optional gzip  │
//! └───────────────────────────┴───────────────────────────────────-─┘
//!                     EvictionPolicy (C2), CacheStatistics (C3)
//! ```
//!
//! # Modules
//!
//! - [`cache`]: the cache subsystem itself (all ten components).
//! - [`error`]: error types shared across the subsystem.

pub mod cache;
pub mod error;

pub use error::{Error, Result};

pub use cache::{
    CacheEntry, CacheStatistics, EntryPriority, EvictionPolicy, MultiLevelCache,
    MultiLevelCacheConfiguration, StorageCache,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
