//! Cluster message bus for cross-process cache invalidation.
//!
//! Worker processes do not share memory; each holds its own copy of the
//! sub-location cache. Consistency is maintained by broadcasting invalidation
//! topics over this bus: fire-and-forget, no acknowledgement, no ordering
//! guarantee beyond eventual delivery. A single-instance deployment can use
//! [`LocalClusterBus`]; a multi-instance deployment backs [`ClusterBus`] with
//! a real broker.

use std::sync::Arc;
use tokio::sync::broadcast;

/// Default buffer size for the broadcast channel.
/// Slow receivers lag and drop older topics beyond this limit.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Invalidation topics carried on the bus.
///
/// Only `ClearLocationCache` belongs to this subsystem. `ClearUserCache`
/// travels on the same bus for an unrelated collaborator and must be ignored
/// by location-cache subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTopic {
    ClearLocationCache,
    ClearUserCache,
}

impl ClusterTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearLocationCache => "clear-location-cache",
            Self::ClearUserCache => "clear-user-cache",
        }
    }
}

impl std::fmt::Display for ClusterTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fan-out publish/subscribe primitive connecting sibling worker processes.
pub trait ClusterBus: Send + Sync {
    /// Publish a topic to every subscriber.
    ///
    /// Returns the number of subscribers that received it; 0 when nobody is
    /// listening. Delivery is best-effort.
    fn publish(&self, topic: ClusterTopic) -> usize;

    /// Subscribe to topics published after this call.
    fn subscribe(&self) -> broadcast::Receiver<ClusterTopic>;
}

/// Bus backed by a tokio broadcast channel.
///
/// Cloneable and shareable; within one process this is a loopback, across
/// processes the same type fronts whatever transport carries the signal.
#[derive(Clone)]
pub struct BroadcastClusterBus {
    sender: broadcast::Sender<ClusterTopic>,
}

impl BroadcastClusterBus {
    /// Create a new bus with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new bus wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl ClusterBus for BroadcastClusterBus {
    fn publish(&self, topic: ClusterTopic) -> usize {
        self.sender.send(topic).unwrap_or_default()
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterTopic> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastClusterBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastClusterBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastClusterBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// No-op bus for single-instance deployments.
///
/// Publishing goes nowhere and subscribers never receive anything; the sender
/// is held only so returned receivers stay open instead of erroring.
#[derive(Debug)]
pub struct LocalClusterBus {
    _sender: broadcast::Sender<ClusterTopic>,
}

impl LocalClusterBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { _sender: sender }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ClusterBus for LocalClusterBus {
    fn publish(&self, _topic: ClusterTopic) -> usize {
        0
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterTopic> {
        self._sender.subscribe()
    }
}

impl Default for LocalClusterBus {
    fn default() -> Self {
        Self::new()
    }
}
