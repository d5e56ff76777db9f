//! Synchronously readable lookup caches maintained by background monitors.
//!
//! Two instances exist for the process lifetime: the peer public key cache
//! and the open channel point cache. Each is owned by exactly one monitor
//! task on the write path; readers take lock-free snapshots and never wait
//! on the monitor. Every mutation replaces the whole map atomically, so a
//! reader can never observe a half-applied update.

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::channels::CacheUpdateReceiver;

/// Incremental membership change applied by a cache monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    Add { node_id: i32, value: String },
    Remove { node_id: i32, value: String },
}

/// A node-scoped set of external identifiers with atomic-replace updates.
///
/// The underlying map is never exposed; reads go through [`get`](Self::get)
/// and [`contains`](Self::contains) only.
pub struct NodeScopedSetCache {
    name: &'static str,
    map: ArcSwap<HashMap<i32, HashSet<String>>>,
}

impl NodeScopedSetCache {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            map: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Replace the entry for `node_id` with `values` in one atomic swap.
    ///
    /// Used for the initial load; concurrent readers see either the old or
    /// the new set, never a mixture.
    pub fn init(&self, node_id: i32, values: Vec<String>) {
        let mut next: HashMap<i32, HashSet<String>> = self.map.load().as_ref().clone();
        let set: HashSet<String> = values.into_iter().collect();
        info!(cache = self.name, node_id, entries = set.len(), "cache initialized");
        next.insert(node_id, set);
        self.map.store(Arc::new(next));
    }

    /// Snapshot of the set for `node_id`. Empty if unknown.
    pub fn get(&self, node_id: i32) -> HashSet<String> {
        self.map
            .load()
            .get(&node_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Membership test without cloning the set.
    pub fn contains(&self, node_id: i32, value: &str) -> bool {
        self.map
            .load()
            .get(&node_id)
            .is_some_and(|set| set.contains(value))
    }

    /// Apply one incremental update via copy-and-swap.
    ///
    /// A no-op update (adding a present value, removing an absent one) is
    /// logged at debug and skipped without rebuilding the map.
    pub fn apply(&self, update: CacheUpdate) {
        let current = self.map.load();
        let (node_id, value, add) = match &update {
            CacheUpdate::Add { node_id, value } => (*node_id, value, true),
            CacheUpdate::Remove { node_id, value } => (*node_id, value, false),
        };

        let present = current
            .get(&node_id)
            .is_some_and(|set| set.contains(value.as_str()));
        if present == add {
            debug!(cache = self.name, node_id, value = %value, add, "cache update is a no-op");
            return;
        }

        let mut next: HashMap<i32, HashSet<String>> = current.as_ref().clone();
        let entry = next.entry(node_id).or_default();
        if add {
            entry.insert(value.clone());
        } else {
            entry.remove(value.as_str());
        }
        debug!(cache = self.name, node_id, value = %value, add, "cache updated");
        self.map.store(Arc::new(next));
    }
}

/// The two process-wide caches, cheap to clone and share.
#[derive(Clone)]
pub struct Caches {
    pub peer_keys: Arc<NodeScopedSetCache>,
    pub channel_points: Arc<NodeScopedSetCache>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            peer_keys: Arc::new(NodeScopedSetCache::new("peer-keys")),
            channel_points: Arc::new(NodeScopedSetCache::new("channel-points")),
        }
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one cache monitor until the scope is cancelled.
///
/// Consumes update notifications and applies them to the cache. Faults in
/// individual updates never crash the loop; a stale cache is preferable to
/// a dead process.
pub async fn run_monitor(
    cache: Arc<NodeScopedSetCache>,
    cancel: CancellationToken,
    mut updates: CacheUpdateReceiver,
) {
    info!(cache = cache.name, "cache monitor started");
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(cache = cache.name, "cache monitor shutting down");
                break;
            }

            maybe = updates.recv() => {
                match maybe {
                    Some(update) => cache.apply(update),
                    None => {
                        info!(cache = cache.name, "cache update channel closed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channels::cache_update_channel;
    use std::time::Duration;

    #[test]
    fn get_after_init_returns_exact_set() {
        let cache = NodeScopedSetCache::new("test");
        cache.init(1, vec!["02aa".into(), "02bb".into(), "02cc".into()]);

        let got = cache.get(1);
        let expected: HashSet<String> =
            ["02aa", "02bb", "02cc"].iter().map(|s| s.to_string()).collect();
        assert_eq!(got, expected);
        assert!(cache.get(2).is_empty());
    }

    #[test]
    fn init_replaces_previous_entry_atomically() {
        let cache = NodeScopedSetCache::new("test");
        cache.init(1, vec!["02aa".into()]);
        cache.init(1, vec!["02bb".into()]);
        assert!(!cache.contains(1, "02aa"));
        assert!(cache.contains(1, "02bb"));
    }

    #[test]
    fn apply_add_and_remove() {
        let cache = NodeScopedSetCache::new("test");
        cache.init(1, vec![]);
        cache.apply(CacheUpdate::Add {
            node_id: 1,
            value: "point:0".into(),
        });
        assert!(cache.contains(1, "point:0"));
        cache.apply(CacheUpdate::Remove {
            node_id: 1,
            value: "point:0".into(),
        });
        assert!(!cache.contains(1, "point:0"));
        // Removing again is a logged no-op, not a failure.
        cache.apply(CacheUpdate::Remove {
            node_id: 1,
            value: "point:0".into(),
        });
        assert!(cache.get(1).is_empty());
    }

    #[tokio::test]
    async fn monitor_applies_updates_until_cancelled() {
        let cache = Arc::new(NodeScopedSetCache::new("test"));
        let cancel = CancellationToken::new();
        let (tx, rx) = cache_update_channel();
        let handle = tokio::spawn(run_monitor(cache.clone(), cancel.clone(), rx));

        tx.send(CacheUpdate::Add {
            node_id: 7,
            value: "02dd".into(),
        })
        .await
        .unwrap();

        // Wait for the monitor to drain the update.
        tokio::time::timeout(Duration::from_secs(1), async {
            while !cache.contains(7, "02dd") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn monitor_exits_when_all_senders_drop() {
        let cache = Arc::new(NodeScopedSetCache::new("test"));
        let cancel = CancellationToken::new();
        let (tx, rx) = cache_update_channel();
        let handle = tokio::spawn(run_monitor(cache, cancel, rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
