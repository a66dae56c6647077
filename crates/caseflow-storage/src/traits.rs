//! Storage traits for the location storage abstraction layer.

use async_trait::async_trait;

use caseflow_core::Location;

use crate::error::StorageError;
use crate::types::{LocationFilter, Page};

/// The storage contract for the location collection.
///
/// Implementations must be thread-safe (`Send + Sync`). Missing records are
/// reported through `Option`/`NotFound`; everything else is an infrastructure
/// error.
///
/// # Example
///
/// ```ignore
/// use caseflow_storage::{LocationStore, LocationFilter, Page};
///
/// async fn children_of(store: &dyn LocationStore, id: &str) -> Result<Vec<Location>, StorageError> {
///     let filter = LocationFilter::new().with_parent_ids(vec![id.to_string()]);
///     store.find(&filter, &Page::first(10_000)).await
/// }
/// ```
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Finds locations matching the filter, ordered by creation time then id.
    ///
    /// Soft-deleted records are excluded unless the filter includes them.
    async fn find(&self, filter: &LocationFilter, page: &Page)
    -> Result<Vec<Location>, StorageError>;

    /// Counts locations matching the filter.
    async fn count(&self, filter: &LocationFilter) -> Result<usize, StorageError>;

    /// Reads a location by id. Returns `None` for missing or soft-deleted
    /// records.
    async fn get(&self, id: &str) -> Result<Option<Location>, StorageError>;

    /// Inserts a new location, assigning an id when none is set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` when the id is taken.
    async fn insert(&self, location: Location) -> Result<Location, StorageError>;

    /// Replaces an existing location.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the location does not exist.
    async fn update(&self, location: Location) -> Result<Location, StorageError>;

    /// Soft-deletes a location by id.
    ///
    /// Deleting a missing or already-deleted location succeeds (idempotent).
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
