//! Observability events emitted by a [`crate::cache::manager::MultiLevelCache`]
//! for monitoring. Keys are rendered to their `Display` string so the
//! event stream stays serializable regardless of the cache's `K` type.

use crate::cache::tier::CacheTier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEvent {
    Put { key: String, tier: CacheTier },
    Hit { key: String, tier: CacheTier },
    Miss { key: String },
    Delete { key: String },
    Evict { key: String, tier: CacheTier, reason: EvictionReason },
    Promote { key: String, from: CacheTier, to: CacheTier },
    Demote { key: String, from: CacheTier, to: CacheTier },
    WarmingCompleted { warmed: u64, total: u64, duration_ms: u64 },
    WarmingCancelled { reason: String },
    WarmingFailed { reason: String },
    TierUnavailable { tier: CacheTier },
    TierRecovered { tier: CacheTier },
    TierCleared { tier: CacheTier },
    CompressionFailed { key: String, reason: String },
}

impl CacheEvent {
    pub fn put(key: impl ToString, tier: CacheTier) -> Self {
        CacheEvent::Put { key: key.to_string(), tier }
    }

    pub fn hit(key: impl ToString, tier: CacheTier) -> Self {
        CacheEvent::Hit { key: key.to_string(), tier }
    }

    pub fn miss(key: impl ToString) -> Self {
        CacheEvent::Miss { key: key.to_string() }
    }

    pub fn evict(key: impl ToString, tier: CacheTier, reason: EvictionReason) -> Self {
        CacheEvent::Evict { key: key.to_string(), tier, reason }
    }

    pub fn promote(key: impl ToString, from: CacheTier, to: CacheTier) -> Self {
        CacheEvent::Promote { key: key.to_string(), from, to }
    }

    pub fn demote(key: impl ToString, from: CacheTier, to: CacheTier) -> Self {
        CacheEvent::Demote { key: key.to_string(), from, to }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CacheEvent::TierUnavailable { .. }
                | CacheEvent::CompressionFailed { .. }
                | CacheEvent::WarmingFailed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    Capacity,
    Expired,
    Manual,
    Corrupted,
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionReason::Capacity => write!(f, "capacity"),
            EvictionReason::Expired => write!(f, "expired"),
            EvictionReason::Manual => write!(f, "manual"),
            EvictionReason::Corrupted => write!(f, "corrupted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_is_not_an_error() {
        assert!(!CacheEvent::hit("k", CacheTier::L1Memory).is_error());
    }

    #[test]
    fn tier_unavailable_is_an_error() {
        assert!(CacheEvent::TierUnavailable { tier: CacheTier::L2Disk }.is_error());
    }

    #[test]
    fn eviction_reason_display() {
        assert_eq!(EvictionReason::Expired.to_string(), "expired");
    }
}
