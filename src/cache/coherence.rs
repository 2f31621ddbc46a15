//! Coherence across peer cache instances.
//!
//! Mirrors the observability event bus's broadcast shape, but instead of
//! reporting what happened, this dispatches operations that *should*
//! happen to registered peers. The registry holds only weak references:
//! a coherence manager must never be the reason a cache outlives its
//! owner.
//!
//! `WriteThrough` fans an operation out to every live peer and awaits
//! all of them before returning, so a caller who awaits `notify` knows
//! every peer has converged (or recorded a failure) by the time it
//! returns. `WriteBack` applies the same fan-out on a detached task:
//! the caller's write completes immediately and peers catch up
//! best-effort.

use crate::cache::entry::EntryPriority;
use crate::cache::StorageCache;
use crate::error::Result;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoherenceStrategy {
    /// Every write is applied to every peer before `put` returns.
    WriteThrough,
    /// Writes are applied locally immediately; peers are caught up
    /// asynchronously, best-effort.
    WriteBack,
    /// Writes are applied locally; peers are told to drop the key rather
    /// than receive the new value.
    Invalidate,
    /// No coherence traffic at all.
    None,
}

#[derive(Debug, Default)]
pub struct CoherenceStatistics {
    pub operations_dispatched: AtomicU64,
    pub operations_failed: AtomicU64,
}

/// One coherence event to propagate to peers: a write, a removal, or a
/// full-tier clear. `origin` (a registered peer name) is excluded from
/// the fan-out so a cache never re-notifies itself.
#[derive(Clone)]
pub enum CoherenceOperation<K, V> {
    Put { key: K, value: V, priority: EntryPriority },
    Remove { key: K },
    Clear,
}

struct Peer<K, V> {
    name: String,
    handle: Weak<dyn StorageCache<K, V>>,
}

/// Dispatches put/remove/clear operations to a registered set of peer caches.
pub struct CoherenceManager<K, V> {
    strategy: CoherenceStrategy,
    peers: RwLock<Vec<Peer<K, V>>>,
    gate: Arc<Semaphore>,
    stats: Arc<CoherenceStatistics>,
    write_back_delay: Duration,
}

impl<K, V> CoherenceManager<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(strategy: CoherenceStrategy) -> Self {
        Self::with_write_back_delay(strategy, Duration::from_millis(0))
    }

    /// `write_back_delay` is applied before a `WriteBack` fan-out starts,
    /// giving a burst of rapid local writes a chance to coalesce onto the
    /// same peer round trip instead of one dispatch task per write.
    pub fn with_write_back_delay(strategy: CoherenceStrategy, write_back_delay: Duration) -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            strategy,
            peers: RwLock::new(Vec::new()),
            gate: Arc::new(Semaphore::new(num_cpus * 2)),
            stats: Arc::new(CoherenceStatistics::default()),
            write_back_delay,
        }
    }

    pub fn strategy(&self) -> CoherenceStrategy {
        self.strategy
    }

    pub fn register(&self, name: impl Into<String>, peer: &Arc<dyn StorageCache<K, V>>) {
        self.peers.write().push(Peer {
            name: name.into(),
            handle: Arc::downgrade(peer),
        });
    }

    pub fn unregister(&self, name: &str) {
        self.peers.write().retain(|p| p.name != name);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn statistics(&self) -> &CoherenceStatistics {
        &self.stats
    }

    /// Propagates `op` to every live peer except `origin`, per the
    /// configured strategy. `WriteThrough` awaits the full fan-out;
    /// `WriteBack` spawns it and returns immediately.
    pub async fn notify(&self, origin: &str, op: CoherenceOperation<K, V>) -> Result<()> {
        if self.strategy == CoherenceStrategy::None {
            return Ok(());
        }
        let live_peers = self.live_peers_excluding(origin);
        if live_peers.is_empty() {
            return Ok(());
        }
        match self.strategy {
            CoherenceStrategy::WriteBack => {
                let gate = self.gate.clone();
                let stats = self.stats.clone();
                let strategy = self.strategy;
                let delay = self.write_back_delay;
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    dispatch(live_peers, op, strategy, gate, stats).await;
                });
                Ok(())
            }
            _ => {
                dispatch(live_peers, op, self.strategy, self.gate.clone(), self.stats.clone()).await;
                Ok(())
            }
        }
    }

    pub async fn propagate_put(&self, key: K, value: V, priority: EntryPriority) -> Result<()> {
        self.notify("", CoherenceOperation::Put { key, value, priority }).await
    }

    pub async fn propagate_remove(&self, key: &K) -> Result<()> {
        self.notify("", CoherenceOperation::Remove { key: key.clone() }).await
    }

    pub async fn propagate_clear(&self) -> Result<()> {
        self.notify("", CoherenceOperation::Clear).await
    }

    fn live_peers_excluding(&self, origin: &str) -> Vec<Arc<dyn StorageCache<K, V>>> {
        let mut peers = self.peers.write();
        let live: Vec<Arc<dyn StorageCache<K, V>>> = peers
            .iter()
            .filter(|p| p.name != origin)
            .filter_map(|p| p.handle.upgrade())
            .collect();
        peers.retain(|p| p.handle.strong_count() > 0);
        live
    }
}

async fn dispatch<K, V>(
    peers: Vec<Arc<dyn StorageCache<K, V>>>,
    op: CoherenceOperation<K, V>,
    strategy: CoherenceStrategy,
    gate: Arc<Semaphore>,
    stats: Arc<CoherenceStatistics>,
) where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let mut tasks = JoinSet::new();
    for peer in peers {
        let gate = gate.clone();
        let stats = stats.clone();
        let op = op.clone();
        tasks.spawn(async move {
            let permit = gate.acquire_owned().await.ok();
            let result = apply(&peer, strategy, op).await;
            drop(permit);
            result
        });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {
                stats.operations_dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                stats.operations_failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "coherence propagation failed for one peer");
            }
            Err(e) => {
                stats.operations_failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "coherence dispatch task panicked");
            }
        }
    }
}

async fn apply<K, V>(
    peer: &Arc<dyn StorageCache<K, V>>,
    strategy: CoherenceStrategy,
    op: CoherenceOperation<K, V>,
) -> Result<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    match op {
        CoherenceOperation::Put { key, value, priority } => {
            if strategy == CoherenceStrategy::Invalidate {
                peer.remove(&key).await.map(|_| ())
            } else {
                peer.put_with_priority(key, value, priority).await
            }
        }
        CoherenceOperation::Remove { key } => peer.remove(&key).await.map(|_| ()),
        CoherenceOperation::Clear => peer.clear().await,
    }
}
