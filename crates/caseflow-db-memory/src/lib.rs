//! In-memory [`LocationStore`] backend.
//!
//! Backs tests and single-node deployments. Keeps the whole location
//! collection in a concurrent map, evaluates [`LocationFilter`]s by scanning,
//! and soft-deletes like the production backend so that validator queries see
//! the same semantics.
//!
//! [`LocationStore`]: caseflow_storage::LocationStore
//! [`LocationFilter`]: caseflow_storage::LocationFilter

mod store;

pub use store::InMemoryLocationStore;
