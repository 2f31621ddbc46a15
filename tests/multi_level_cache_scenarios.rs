//! Integration scenarios covering the cross-cutting properties of the
//! multi-tier cache: promotion, coherence, expiry, demotion, disposal,
//! and disk-tier restart behavior.

use std::sync::Arc;
use std::time::Duration;
use tiercache::cache::codec::JsonCodec;
use tiercache::cache::coherence::{CoherenceManager, CoherenceOperation, CoherenceStrategy};
use tiercache::cache::entry::{DefaultSizer, EntryPriority};
use tiercache::cache::eviction::LruPolicy;
use tiercache::cache::manager::{MultiLevelCache, MultiLevelCacheConfiguration};
use tiercache::cache::storage::{DiskCache, DiskCacheConfig, InMemoryCache, MemoryCacheConfig, TierStorage};
use tiercache::cache::StorageCache;
use tiercache::Error;

fn l1() -> Arc<InMemoryCache<String, String>> {
    Arc::new(InMemoryCache::new(
        "l1",
        MemoryCacheConfig::default(),
        Arc::new(LruPolicy::default()),
        Arc::new(DefaultSizer),
    ))
}

async fn l2(root: &std::path::Path) -> Arc<DiskCache<String, String>> {
    Arc::new(
        DiskCache::open(
            DiskCacheConfig {
                root_path: root.to_path_buf(),
                ..Default::default()
            },
            Arc::new(JsonCodec::new()),
        )
        .await
        .unwrap(),
    )
}

/// A value written directly into L2 (simulating an entry that predates
/// this process's L1, e.g. left over from a previous run) is invisible
/// to L1 until the first `get` falls through and promotes it; the
/// second `get` is then served entirely out of L1 with no further L2
/// traffic.
#[tokio::test]
async fn l1_miss_falls_through_to_l2_then_promotes() {
    let dir = tempfile::tempdir().unwrap();
    let l2_tier = l2(dir.path()).await;
    TierStorage::put(
        l2_tier.as_ref(),
        "a".to_string(),
        "1".to_string(),
        EntryPriority::Normal,
        None,
    )
    .await
    .unwrap();

    let cache = MultiLevelCache::new("scenario", l1(), Some(l2_tier), MultiLevelCacheConfiguration::default());

    assert_eq!(cache.get(&"a".to_string()).await.unwrap(), Some("1".to_string()));
    assert_eq!(cache.statistics().l1.misses(), 1);
    assert_eq!(cache.statistics().l2.hits(), 1);

    assert_eq!(cache.get(&"a".to_string()).await.unwrap(), Some("1".to_string()));
    assert_eq!(cache.statistics().l1.hits(), 1);
    // no second L2 hit: the first get's promotion already landed the
    // entry in L1.
    assert_eq!(cache.statistics().l2.hits(), 1);
}

/// `NeverEvict` entries survive an eviction pass that would otherwise
/// reclaim them; ordinary entries do not.
#[tokio::test]
async fn never_evict_survives_eviction_pass() {
    let cache_l1 = l1();
    cache_l1.put_sync("pinned".into(), "keep".into(), EntryPriority::NeverEvict, None);
    cache_l1.put_sync("normal".into(), "drop".into(), EntryPriority::Normal, None);
    cache_l1.evict_to_watermark();
    assert!(cache_l1.try_get(&"pinned".to_string()).is_some());
}

/// Exact eviction set: asking to free N entries' worth of bytes evicts
/// exactly the N oldest-accessed keys under LRU, leaving the rest intact.
#[tokio::test]
async fn evict_bytes_reclaims_exact_lru_set() {
    let cache_l1 = l1();
    for i in 0..5 {
        cache_l1.put_sync(format!("k{i}"), "v".into(), EntryPriority::Normal, None);
    }
    let per_entry = cache_l1.size_bytes() / 5;
    let evicted = cache_l1.evict_bytes((per_entry * 2) as usize);
    assert_eq!(evicted, 2);
    assert!(cache_l1.try_get(&"k0".to_string()).is_none());
    assert!(cache_l1.try_get(&"k1".to_string()).is_none());
    assert!(cache_l1.try_get(&"k2".to_string()).is_some());
    assert!(cache_l1.try_get(&"k3".to_string()).is_some());
    assert!(cache_l1.try_get(&"k4".to_string()).is_some());
}

/// `clear_expired` removes only entries whose TTL has lapsed, leaving
/// unexpired entries (including ones with no TTL at all) untouched.
#[tokio::test]
async fn clear_expired_only_removes_expired_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MultiLevelCache::new(
        "scenario",
        l1(),
        Some(l2(dir.path()).await),
        MultiLevelCacheConfiguration::default(),
    );
    cache.put("persists".to_string(), "v".to_string()).await.unwrap();
    let removed = cache.clear_expired().await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(cache.get(&"persists".to_string()).await.unwrap(), Some("v".to_string()));
}

/// Auto-demotion moves aged entries to L2 without ever losing them: the
/// value must be readable through the composed cache before and after.
#[tokio::test]
async fn auto_demotion_preserves_readability() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MultiLevelCache::new(
        "scenario",
        l1(),
        Some(l2(dir.path()).await),
        MultiLevelCacheConfiguration {
            auto_demote: true,
            l1_utilization_threshold: 0.0,
            demotion_age_threshold: Duration::from_millis(0),
            ..Default::default()
        },
    );
    cache.put("a".to_string(), "1".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let demoted = cache.run_auto_demotion().await.unwrap();
    assert_eq!(demoted, 1);
    assert_eq!(cache.get(&"a".to_string()).await.unwrap(), Some("1".to_string()));
}

/// A disposed cache rejects further operations with `Error::Disposed`
/// rather than silently no-op'ing.
#[tokio::test]
async fn disposed_cache_rejects_get_and_put() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MultiLevelCache::new(
        "scenario",
        l1(),
        Some(l2(dir.path()).await),
        MultiLevelCacheConfiguration::default(),
    );
    cache.dispose().await.unwrap();
    assert!(matches!(
        cache.put("a".to_string(), "1".to_string()).await,
        Err(Error::Disposed(_))
    ));
}

/// Write-through coherence propagates a put to every registered, still
/// alive peer; a peer dropped by its owner is silently skipped rather
/// than erroring the whole dispatch.
#[tokio::test]
async fn coherence_write_through_propagates_to_live_peers() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let peer_a: Arc<dyn StorageCache<String, String>> = Arc::new(MultiLevelCache::new(
        "peer-a",
        l1(),
        Some(l2(dir_a.path()).await),
        MultiLevelCacheConfiguration::default(),
    ));
    let peer_b: Arc<dyn StorageCache<String, String>> = Arc::new(MultiLevelCache::new(
        "peer-b",
        l1(),
        Some(l2(dir_b.path()).await),
        MultiLevelCacheConfiguration::default(),
    ));

    let coherence: CoherenceManager<String, String> = CoherenceManager::new(CoherenceStrategy::WriteThrough);
    coherence.register("peer-a", &peer_a);
    coherence.register("peer-b", &peer_b);

    coherence
        .propagate_put("k".to_string(), "v".to_string(), EntryPriority::Normal)
        .await
        .unwrap();

    assert_eq!(peer_a.get(&"k".to_string()).await.unwrap(), Some("v".to_string()));
    assert_eq!(peer_b.get(&"k".to_string()).await.unwrap(), Some("v".to_string()));
}

/// `notify` excludes its own origin from the fan-out, and dispatch
/// statistics track every successful peer application.
#[tokio::test]
async fn coherence_notify_excludes_origin_and_counts_dispatches() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let peer_a: Arc<dyn StorageCache<String, String>> = Arc::new(MultiLevelCache::new(
        "peer-a",
        l1(),
        Some(l2(dir_a.path()).await),
        MultiLevelCacheConfiguration::default(),
    ));
    let peer_b: Arc<dyn StorageCache<String, String>> = Arc::new(MultiLevelCache::new(
        "peer-b",
        l1(),
        Some(l2(dir_b.path()).await),
        MultiLevelCacheConfiguration::default(),
    ));

    let coherence: CoherenceManager<String, String> = CoherenceManager::new(CoherenceStrategy::WriteThrough);
    coherence.register("peer-a", &peer_a);
    coherence.register("peer-b", &peer_b);
    assert_eq!(coherence.peer_count(), 2);

    coherence
        .notify(
            "peer-a",
            CoherenceOperation::Put {
                key: "k".to_string(),
                value: "v".to_string(),
                priority: EntryPriority::Normal,
            },
        )
        .await
        .unwrap();

    // origin excluded: peer-a never receives its own write back.
    assert_eq!(peer_a.get(&"k".to_string()).await.unwrap(), None);
    assert_eq!(peer_b.get(&"k".to_string()).await.unwrap(), Some("v".to_string()));
    assert_eq!(coherence.statistics().operations_dispatched.load(std::sync::atomic::Ordering::Relaxed), 1);
}
