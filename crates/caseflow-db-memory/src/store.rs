use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use caseflow_core::Location;
use caseflow_storage::{LocationFilter, LocationStore, Page, StorageError};

/// A stored record plus its insertion sequence number.
///
/// The sequence number is the creation-order sort key; wall-clock timestamps
/// can collide within one test run.
#[derive(Debug, Clone)]
struct StoredLocation {
    seq: u64,
    location: Location,
}

/// In-memory location storage backend on a concurrent map.
///
/// Filters are evaluated by scanning; results are ordered by insertion
/// sequence so paged traversal rounds are deterministic. Deletion is soft,
/// matching the production backend: deleted records stay in the map and are
/// filtered out of queries unless explicitly included.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    data: DashMap<String, StoredLocation>,
    seq_counter: AtomicU64,
    query_counter: AtomicU64,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find`/`count` queries issued so far.
    ///
    /// Lets tests assert the cache's zero-query property.
    pub fn query_count(&self) -> u64 {
        self.query_counter.load(Ordering::Relaxed)
    }

    /// Number of records, soft-deleted included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn next_seq(&self) -> u64 {
        self.seq_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn record_query(&self) {
        self.query_counter.fetch_add(1, Ordering::Relaxed);
    }

    fn matches(filter: &LocationFilter, location: &Location) -> bool {
        if location.is_deleted() && !filter.include_deleted {
            return false;
        }
        if let Some(ids) = &filter.ids
            && !ids.iter().any(|id| id == &location.id)
        {
            return false;
        }
        if let Some(exclude) = &filter.exclude_ids
            && exclude.iter().any(|id| id == &location.id)
        {
            return false;
        }
        if let Some(parent_ids) = &filter.parent_ids {
            match &location.parent_location_id {
                Some(parent) if parent_ids.iter().any(|p| p == parent) => {}
                _ => return false,
            }
        }
        if let Some(values) = &filter.names_or_synonyms_ci {
            let name = location.normalized_name();
            let synonyms = location.normalized_synonyms();
            let hit = values
                .iter()
                .map(|v| v.trim().to_lowercase())
                .any(|v| v == name || synonyms.contains(&v));
            if !hit {
                return false;
            }
        }
        if let Some(active) = filter.active
            && location.active != active
        {
            return false;
        }
        true
    }

    fn scan(&self, filter: &LocationFilter) -> Vec<StoredLocation> {
        let mut matching: Vec<StoredLocation> = self
            .data
            .iter()
            .filter(|entry| Self::matches(filter, &entry.value().location))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|stored| stored.seq);
        matching
    }
}

#[async_trait]
impl LocationStore for InMemoryLocationStore {
    async fn find(
        &self,
        filter: &LocationFilter,
        page: &Page,
    ) -> Result<Vec<Location>, StorageError> {
        self.record_query();
        Ok(self
            .scan(filter)
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|stored| stored.location)
            .collect())
    }

    async fn count(&self, filter: &LocationFilter) -> Result<usize, StorageError> {
        self.record_query();
        Ok(self.scan(filter).len())
    }

    async fn get(&self, id: &str) -> Result<Option<Location>, StorageError> {
        Ok(self
            .data
            .get(id)
            .map(|entry| entry.value().location.clone())
            .filter(|location| !location.is_deleted()))
    }

    async fn insert(&self, mut location: Location) -> Result<Location, StorageError> {
        if location.id.is_empty() {
            location.id = Uuid::new_v4().to_string();
        }
        if self.data.contains_key(&location.id) {
            return Err(StorageError::already_exists(location.id));
        }
        let stored = StoredLocation {
            seq: self.next_seq(),
            location: location.clone(),
        };
        self.data.insert(location.id.clone(), stored);
        Ok(location)
    }

    async fn update(&self, mut location: Location) -> Result<Location, StorageError> {
        let mut entry = self
            .data
            .get_mut(&location.id)
            .ok_or_else(|| StorageError::not_found(location.id.clone()))?;
        location.touch();
        entry.value_mut().location = location.clone();
        Ok(location)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        // Idempotent: deleting a missing or already-deleted record succeeds.
        if let Some(mut entry) = self.data.get_mut(id) {
            let location = &mut entry.value_mut().location;
            if !location.is_deleted() {
                location.mark_deleted();
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
