//! Eviction policies.
//!
//! Policies are stateless: they carry no bookkeeping of their own and
//! decide purely from the candidate snapshot (last access time, access
//! count, priority, age) the owning tier hands them, which in turn comes
//! straight off each `CacheEntry`. There is exactly one source of truth
//! for that bookkeeping — the entry itself — so a policy can never drift
//! out of sync with what the tier actually stores.
//!
//! `NeverEvict` entries are excluded from LRU/LFU candidacy entirely;
//! the time-based policy keeps them as candidates only once expired.

use crate::cache::entry::EntryPriority;
use chrono::{DateTime, Utc};
use std::hash::Hash;

/// One key's eviction-relevant state, as read off its `CacheEntry` at
/// the moment an eviction pass runs.
#[derive(Debug, Clone)]
pub struct EvictionCandidate<K> {
    pub key: K,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub priority: EntryPriority,
    pub expired: bool,
}

/// Capability every eviction policy implements. Implementations hold no
/// interior mutability beyond whatever stateless comparator they apply.
pub trait EvictionPolicy<K: Eq + Hash + Clone>: Send + Sync {
    /// Returns the keys to evict, in eviction order.
    ///
    /// Stops as soon as *either* target is satisfied: once the
    /// remaining count would be at or below `target_count`, or the
    /// remaining bytes at or below `target_bytes`, whichever comes
    /// first in the candidate ordering.
    fn select_for_eviction(
        &self,
        candidates: &[EvictionCandidate<K>],
        current_count: usize,
        current_bytes: usize,
        target_count: usize,
        target_bytes: usize,
    ) -> Vec<K>;
}

fn eligible<K: Clone>(candidates: &[EvictionCandidate<K>]) -> Vec<&EvictionCandidate<K>> {
    candidates
        .iter()
        .filter(|c| c.priority != EntryPriority::NeverEvict)
        .collect()
}

fn drain_until_targets_met<K: Clone>(
    mut ordered: Vec<&EvictionCandidate<K>>,
    current_count: usize,
    current_bytes: usize,
    target_count: usize,
    target_bytes: usize,
) -> Vec<K> {
    let mut out = Vec::new();
    let mut remaining_count = current_count;
    let mut remaining_bytes = current_bytes;
    ordered.reverse(); // pop from the end in eviction order
    while let Some(candidate) = ordered.pop() {
        if remaining_count <= target_count || remaining_bytes <= target_bytes {
            break;
        }
        remaining_count = remaining_count.saturating_sub(1);
        remaining_bytes = remaining_bytes.saturating_sub(candidate.size_bytes);
        out.push(candidate.key.clone());
    }
    out
}

/// Evicts the least-recently-used key first; ties broken by oldest insert.
#[derive(Debug, Default)]
pub struct LruPolicy;

impl<K: Eq + Hash + Clone + Send + Sync> EvictionPolicy<K> for LruPolicy {
    fn select_for_eviction(
        &self,
        candidates: &[EvictionCandidate<K>],
        current_count: usize,
        current_bytes: usize,
        target_count: usize,
        target_bytes: usize,
    ) -> Vec<K> {
        let mut ordered = eligible(candidates);
        ordered.sort_by(|a, b| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then(a.created_at.cmp(&b.created_at))
        });
        drain_until_targets_met(ordered, current_count, current_bytes, target_count, target_bytes)
    }
}

/// Evicts the least-frequently-accessed key first; ties broken by oldest access.
#[derive(Debug, Default)]
pub struct LfuPolicy;

impl<K: Eq + Hash + Clone + Send + Sync> EvictionPolicy<K> for LfuPolicy {
    fn select_for_eviction(
        &self,
        candidates: &[EvictionCandidate<K>],
        current_count: usize,
        current_bytes: usize,
        target_count: usize,
        target_bytes: usize,
    ) -> Vec<K> {
        let mut ordered = eligible(candidates);
        ordered.sort_by(|a, b| {
            a.access_count
                .cmp(&b.access_count)
                .then(a.last_accessed_at.cmp(&b.last_accessed_at))
        });
        drain_until_targets_met(ordered, current_count, current_bytes, target_count, target_bytes)
    }
}

/// Evicts expired entries first, then (only if still over target)
/// unexpired, non-`NeverEvict` entries oldest-first. `NeverEvict` is
/// candidate-eligible once expired — a TTL is a promise about
/// staleness, which priority does not override.
#[derive(Debug, Default)]
pub struct TimeBasedPolicy;

impl<K: Eq + Hash + Clone + Send + Sync> EvictionPolicy<K> for TimeBasedPolicy {
    fn select_for_eviction(
        &self,
        candidates: &[EvictionCandidate<K>],
        current_count: usize,
        current_bytes: usize,
        target_count: usize,
        target_bytes: usize,
    ) -> Vec<K> {
        let mut ordered: Vec<&EvictionCandidate<K>> = candidates
            .iter()
            .filter(|c| c.expired || c.priority != EntryPriority::NeverEvict)
            .collect();
        ordered.sort_by(|a, b| b.expired.cmp(&a.expired).then(a.created_at.cmp(&b.created_at)));
        drain_until_targets_met(ordered, current_count, current_bytes, target_count, target_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(key: &str, secs_ago: i64, priority: EntryPriority) -> EvictionCandidate<String> {
        let now = Utc::now();
        EvictionCandidate {
            key: key.to_string(),
            size_bytes: 10,
            created_at: now - chrono::Duration::seconds(secs_ago),
            last_accessed_at: now - chrono::Duration::seconds(secs_ago),
            access_count: 0,
            priority,
            expired: false,
        }
    }

    #[test]
    fn lru_evicts_oldest_access_first() {
        let candidates = vec![
            candidate("a", 10, EntryPriority::Normal),
            candidate("b", 1, EntryPriority::Normal),
        ];
        let victims = LruPolicy.select_for_eviction(&candidates, 2, 20, 0, 0);
        assert_eq!(victims, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn lru_never_evict_excluded() {
        let candidates = vec![candidate("a", 10, EntryPriority::NeverEvict)];
        let victims = LruPolicy.select_for_eviction(&candidates, 1, 10, 0, 0);
        assert!(victims.is_empty());
    }

    #[test]
    fn lfu_evicts_least_accessed_first() {
        let mut candidates = vec![candidate("a", 1, EntryPriority::Normal), candidate("b", 1, EntryPriority::Normal)];
        candidates[1].access_count = 5;
        let victims = LfuPolicy.select_for_eviction(&candidates, 2, 20, 1, 0);
        assert_eq!(victims, vec!["a".to_string()]);
    }

    #[test]
    fn time_based_skips_unexpired_never_evict() {
        let candidates = vec![candidate("a", 10, EntryPriority::NeverEvict)];
        assert!(TimeBasedPolicy.select_for_eviction(&candidates, 1, 10, 0, 0).is_empty());
        let mut expired = candidates;
        expired[0].expired = true;
        assert_eq!(
            TimeBasedPolicy.select_for_eviction(&expired, 1, 10, 0, 0),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn stops_as_soon_as_either_target_met() {
        // target_bytes satisfied after evicting "a" alone (10 <= 20), even
        // though target_count (0) would otherwise demand evicting "b" too.
        let candidates = vec![
            candidate("a", 10, EntryPriority::Normal),
            candidate("b", 5, EntryPriority::Normal),
        ];
        let victims = LruPolicy.select_for_eviction(&candidates, 2, 30, 0, 20);
        assert_eq!(victims, vec!["a".to_string()]);
    }

    #[test]
    fn count_target_can_stop_eviction_before_bytes_target() {
        let candidates = vec![
            candidate("a", 10, EntryPriority::Normal),
            candidate("b", 5, EntryPriority::Normal),
        ];
        // current_count already at target_count, so nothing is evicted
        // even though current_bytes is above target_bytes.
        let victims = LruPolicy.select_for_eviction(&candidates, 2, 30, 2, 0);
        assert!(victims.is_empty());
    }
}
