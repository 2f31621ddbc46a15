//! Cache tier identity.
//!
//! The subsystem is strictly two-tier: an in-memory tier (L1) and a disk
//! tier (L2). Unlike size-routed hierarchies, placement here is driven
//! by write policy (write-through / priority threshold) rather than
//! object size — see [`crate::cache::manager`], whose
//! `MultiLevelCacheConfiguration` carries each tier's own capacity
//! config (`MemoryCacheConfig`, `DiskCacheConfig`).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    L1Memory,
    L2Disk,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::L1Memory => write!(f, "L1Memory"),
            CacheTier::L2Disk => write!(f, "L2Disk"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_variant() {
        assert_eq!(CacheTier::L1Memory.to_string(), "L1Memory");
        assert_eq!(CacheTier::L2Disk.to_string(), "L2Disk");
    }
}
