pub mod cluster;
pub mod error;
pub mod location;

pub use cluster::{BroadcastClusterBus, ClusterBus, ClusterTopic, LocalClusterBus};
pub use error::{CoreError, ErrorCategory, Result};
pub use location::{GeoPoint, Location, LocationIdentifier};
