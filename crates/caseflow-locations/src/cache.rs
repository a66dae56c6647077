//! Per-process memo of parent→children edges over the location graph.
//!
//! The cache stores ids only, never records. Absence of a key means "children
//! not yet resolved"; presence (even an empty list) means enumeration is
//! complete as of the last reset. Each worker process holds an independent
//! copy; a local reset broadcasts `ClearLocationCache` on the cluster bus so
//! sibling processes drop theirs. A reader on another worker may briefly see
//! a stale cache after a write elsewhere; that eventual consistency is
//! accepted.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use caseflow_core::{ClusterBus, ClusterTopic};

/// Whether a reset was triggered in this process or received over the bus.
///
/// Only local resets are re-broadcast; echoing a remote signal would ping-pong
/// invalidations around the cluster forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOrigin {
    Local,
    Remote,
}

/// In-memory, partially memoizing cache of parent→children location edges.
///
/// Explicitly constructed and injected, never a module-level singleton.
/// There is no locking beyond the map itself: two concurrent resolutions of
/// the same uncached id may both query storage, and both writes merge
/// idempotently.
pub struct SubLocationCache {
    entries: DashMap<String, Vec<String>>,
    enabled: bool,
    bus: Arc<dyn ClusterBus>,
}

impl SubLocationCache {
    pub fn new(enabled: bool, bus: Arc<dyn ClusterBus>) -> Self {
        Self {
            entries: DashMap::new(),
            enabled,
            bus,
        }
    }

    pub fn new_shared(enabled: bool, bus: Arc<dyn ClusterBus>) -> Arc<Self> {
        Arc::new(Self::new(enabled, bus))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Known children of `id`. `None` means the children have not been
    /// resolved yet; `Some` is authoritative as of the last reset.
    ///
    /// Pure read, no I/O.
    pub fn children(&self, id: &str) -> Option<Vec<String>> {
        if !self.enabled {
            return None;
        }
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Creates an entry with no children for a cache miss about to be
    /// resolved, bounding duplicate concurrent resolution of the same id.
    pub fn mark_resolving(&self, id: &str) {
        if !self.enabled {
            return;
        }
        self.entries.entry(id.to_string()).or_default();
    }

    /// Records children of `id`, merging with whatever is already known.
    ///
    /// Idempotent append-dedupe rather than overwrite: children of one parent
    /// can be discovered across several batched rounds.
    pub fn set_children(&self, id: &str, child_ids: &[String]) {
        if !self.enabled {
            return;
        }
        let mut entry = self.entries.entry(id.to_string()).or_default();
        for child in child_ids {
            if !entry.contains(child) {
                entry.push(child.clone());
            }
        }
    }

    /// Number of parent entries currently memoized.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears the whole memo. A local reset also publishes the invalidation
    /// topic so every sibling process resets its own copy.
    pub fn reset(&self, origin: ResetOrigin) {
        if !self.enabled {
            return;
        }
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, ?origin, "sub-location cache reset");
        if origin == ResetOrigin::Local {
            self.bus.publish(ClusterTopic::ClearLocationCache);
        }
    }

    /// Spawns the bus listener that keeps this cache consistent with writes
    /// happening in sibling processes.
    ///
    /// `ClearUserCache` travels on the same bus for an unrelated collaborator
    /// and is ignored. A lagged receiver has lost signals, so it resets
    /// conservatively.
    pub fn spawn_invalidation_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut rx = cache.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ClusterTopic::ClearLocationCache) => {
                        info!("received location cache invalidation");
                        cache.reset(ResetOrigin::Remote);
                    }
                    Ok(other) => {
                        debug!(topic = %other, "ignoring unrelated cluster topic");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "invalidation receiver lagged, resetting cache");
                        cache.reset(ResetOrigin::Remote);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl std::fmt::Debug for SubLocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubLocationCache")
            .field("enabled", &self.enabled)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_core::{BroadcastClusterBus, LocalClusterBus};

    fn cache_with_bus() -> (Arc<SubLocationCache>, Arc<BroadcastClusterBus>) {
        let bus = BroadcastClusterBus::new_shared();
        let cache = SubLocationCache::new_shared(true, bus.clone());
        (cache, bus)
    }

    #[test]
    fn test_children_absent_means_unresolved() {
        let (cache, _bus) = cache_with_bus();
        assert_eq!(cache.children("a"), None);

        cache.mark_resolving("a");
        // Present-but-empty means "enumeration complete / in flight", not
        // "unresolved".
        assert_eq!(cache.children("a"), Some(vec![]));
    }

    #[test]
    fn test_set_children_merges_and_dedupes() {
        let (cache, _bus) = cache_with_bus();
        cache.set_children("a", &["b".to_string(), "c".to_string()]);
        cache.set_children("a", &["c".to_string(), "d".to_string()]);
        assert_eq!(
            cache.children("a"),
            Some(vec!["b".to_string(), "c".to_string(), "d".to_string()])
        );
    }

    #[test]
    fn test_local_reset_broadcasts() {
        let (cache, bus) = cache_with_bus();
        let mut rx = bus.subscribe();

        cache.set_children("a", &["b".to_string()]);
        cache.reset(ResetOrigin::Local);

        assert!(cache.is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            ClusterTopic::ClearLocationCache
        );
    }

    #[test]
    fn test_remote_reset_does_not_rebroadcast() {
        let (cache, bus) = cache_with_bus();
        let mut rx = bus.subscribe();

        cache.set_children("a", &["b".to_string()]);
        cache.reset(ResetOrigin::Remote);

        assert!(cache.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_cache_is_noop() {
        let bus = BroadcastClusterBus::new_shared();
        let mut rx = bus.subscribe();
        let cache = SubLocationCache::new(false, bus.clone());

        cache.mark_resolving("a");
        cache.set_children("a", &["b".to_string()]);
        assert_eq!(cache.children("a"), None);
        assert!(cache.is_empty());

        cache.reset(ResetOrigin::Local);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listener_resets_on_remote_signal() {
        let (cache, bus) = cache_with_bus();
        let handle = cache.spawn_invalidation_listener();

        cache.set_children("a", &["b".to_string()]);
        bus.publish(ClusterTopic::ClearLocationCache);

        for _ in 0..100 {
            if cache.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(cache.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_listener_ignores_user_cache_topic() {
        let (cache, bus) = cache_with_bus();
        let handle = cache.spawn_invalidation_listener();

        cache.set_children("a", &["b".to_string()]);
        bus.publish(ClusterTopic::ClearUserCache);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(cache.children("a"), Some(vec!["b".to_string()]));
        handle.abort();
    }

    #[test]
    fn test_local_bus_reset_is_silent() {
        let cache = SubLocationCache::new(true, LocalClusterBus::new_shared());
        cache.set_children("a", &["b".to_string()]);
        cache.reset(ResetOrigin::Local);
        assert!(cache.is_empty());
    }
}
