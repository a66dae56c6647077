//! Location hierarchy resolver and cache for the Caseflow server.
//!
//! The location collection is a forest linked by `parentLocationId`. This
//! crate owns everything that traverses or validates that forest:
//!
//! - [`SubLocationCache`]: per-process memo of parent→children edges, kept
//!   consistent across worker processes by invalidation signals on the
//!   cluster message bus;
//! - [`LocationResolver`]: batched, cycle-safe expansion of seed ids into
//!   descendant or ancestor sets, through the cache or via paged storage
//!   rounds;
//! - [`tree`]: order-independent construction of nested
//!   [`HierarchicalNode`] trees from flat lists, and flattening back into
//!   dotted id paths;
//! - [`ImportValidator`]: the multi-stage pre-write validation pipeline for
//!   hierarchical import batches;
//! - [`LocationService`]: the single write path (CRUD guards plus cache
//!   invalidation).
//!
//! [`HierarchicalNode`]: tree::HierarchicalNode

pub mod cache;
pub mod config;
pub mod error;
pub mod import;
pub mod resolver;
pub mod service;
pub mod tree;

pub use cache::{ResetOrigin, SubLocationCache};
pub use config::LocationsConfig;
pub use error::{LocationError, Result};
pub use import::{
    ImportError, ImportFailure, ImportFailureCode, ImportRecord, ImportValidator, ImportWorkingSet,
};
pub use resolver::LocationResolver;
pub use service::{LocationService, NoUsage, UsageChecker};
pub use tree::{BuildTreeOptions, HierarchicalNode, build_tree, flatten_to_references};
