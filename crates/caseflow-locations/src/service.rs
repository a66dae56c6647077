//! Write path for the location collection.
//!
//! Every mutation flows through [`LocationService`] so the sub-location
//! cache is invalidated in exactly one place. Reads that need traversal go
//! through the resolver instead.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use caseflow_core::Location;
use caseflow_storage::{LocationFilter, LocationStore, Page};

use crate::cache::{ResetOrigin, SubLocationCache};
use crate::config::LocationsConfig;
use crate::error::{LocationError, Result};
use crate::resolver::LocationResolver;
use crate::tree::HierarchicalNode;

/// Answers whether other collections (cases, contacts, follow-ups) still
/// reference any of the given location ids. Deletion is refused while they
/// do.
#[async_trait]
pub trait UsageChecker: Send + Sync {
    async fn is_referenced(&self, location_ids: &[String]) -> Result<bool>;
}

/// Usage checker for deployments without referencing collections wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUsage;

#[async_trait]
impl UsageChecker for NoUsage {
    async fn is_referenced(&self, _location_ids: &[String]) -> Result<bool> {
        Ok(false)
    }
}

pub struct LocationService {
    store: Arc<dyn LocationStore>,
    cache: Arc<SubLocationCache>,
    usage: Arc<dyn UsageChecker>,
    resolver: LocationResolver,
    page_size: usize,
}

impl LocationService {
    pub fn new(
        store: Arc<dyn LocationStore>,
        cache: Arc<SubLocationCache>,
        usage: Arc<dyn UsageChecker>,
        config: &LocationsConfig,
    ) -> Self {
        let resolver = LocationResolver::new(store.clone(), cache.clone(), config);
        Self {
            store,
            cache,
            usage,
            resolver,
            page_size: config.page_size,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Location> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| LocationError::not_found(id))
    }

    /// Creates a location after checking name/synonym uniqueness within its
    /// sibling group.
    pub async fn create(&self, location: Location) -> Result<Location> {
        if location.name.trim().is_empty() {
            return Err(LocationError::invalid("location name is blank"));
        }
        self.assert_sibling_unique(&location).await?;
        let created = self.store.insert(location).await?;
        info!(id = %created.id, "location created");
        self.cache.reset(ResetOrigin::Local);
        Ok(created)
    }

    /// Updates a location, re-checking sibling uniqueness against everything
    /// except the record itself.
    pub async fn update(&self, location: Location) -> Result<Location> {
        if location.name.trim().is_empty() {
            return Err(LocationError::invalid("location name is blank"));
        }
        self.assert_sibling_unique(&location).await?;
        let updated = self.store.update(location).await?;
        info!(id = %updated.id, "location updated");
        self.cache.reset(ResetOrigin::Local);
        Ok(updated)
    }

    /// Soft-deletes a location, refused while the location or any of its
    /// descendants is still referenced elsewhere.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.get(id).await?;
        let subtree = self.resolver.resolve_descendants(&[id.to_string()]).await?;
        if self.usage.is_referenced(&subtree).await? {
            return Err(LocationError::in_use(id));
        }
        self.store.delete(id).await?;
        info!(id, descendants = subtree.len() - 1, "location deleted");
        self.cache.reset(ResetOrigin::Local);
        Ok(())
    }

    /// Marks a location inactive, refused while any direct child is active.
    pub async fn deactivate(&self, id: &str) -> Result<Location> {
        let mut location = self.get(id).await?;
        let filter = LocationFilter::new()
            .with_parent_ids(vec![id.to_string()])
            .with_active(true);
        let active_children = self.store.count(&filter).await?;
        if active_children > 0 {
            return Err(LocationError::active_children(id));
        }

        location.active = false;
        location.touch();
        let updated = self.store.update(location).await?;
        info!(id, "location deactivated");
        self.cache.reset(ResetOrigin::Local);
        Ok(updated)
    }

    /// Persists a built tree under `parent_id`, creating every parent before
    /// its children so each child can carry the assigned parent id. Nodes
    /// without a location are skipped together with their subtrees.
    pub async fn persist_tree(
        &self,
        parent_id: Option<&str>,
        nodes: &[HierarchicalNode],
    ) -> Result<Vec<Location>> {
        let mut created = Vec::new();
        let mut stack: Vec<(&HierarchicalNode, Option<String>)> = nodes
            .iter()
            .rev()
            .map(|node| (node, parent_id.map(String::from)))
            .collect();

        while let Some((node, parent)) = stack.pop() {
            let Some(location) = &node.location else {
                continue;
            };
            let mut location = location.clone();
            location.parent_location_id = parent;
            let persisted = self.create(location).await?;
            let assigned = Some(persisted.id.clone());
            for child in node.children.iter().rev() {
                stack.push((child, assigned.clone()));
            }
            created.push(persisted);
        }

        Ok(created)
    }

    /// One case-insensitive query over the record's name and synonyms,
    /// filtered down to hits in the same sibling group.
    async fn assert_sibling_unique(&self, location: &Location) -> Result<()> {
        let mut candidates: HashSet<String> =
            std::iter::once(location.normalized_name())
                .chain(location.normalized_synonyms())
                .collect();
        candidates.retain(|v| !v.is_empty());
        if candidates.is_empty() {
            return Ok(());
        }

        let filter = LocationFilter::new()
            .with_names_or_synonyms_ci(candidates.iter().cloned().collect());
        let hits = self
            .store
            .find(&filter, &Page::first(self.page_size))
            .await?;

        for hit in hits {
            if hit.id == location.id || hit.parent_location_id != location.parent_location_id {
                continue;
            }
            let hit_values: HashSet<String> = std::iter::once(hit.normalized_name())
                .chain(hit.normalized_synonyms())
                .collect();
            if let Some(value) = candidates.iter().find(|c| hit_values.contains(*c)) {
                return Err(LocationError::duplicate_sibling(
                    value.as_str(),
                    location.parent_location_id.as_deref(),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationService")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_core::BroadcastClusterBus;
    use caseflow_db_memory::InMemoryLocationStore;

    struct Fixture {
        store: Arc<InMemoryLocationStore>,
        cache: Arc<SubLocationCache>,
        service: LocationService,
    }

    fn fixture_with_usage(usage: Arc<dyn UsageChecker>) -> Fixture {
        let store = Arc::new(InMemoryLocationStore::new());
        let cache = SubLocationCache::new_shared(true, BroadcastClusterBus::new_shared());
        let service = LocationService::new(
            store.clone(),
            cache.clone(),
            usage,
            &LocationsConfig::default(),
        );
        Fixture {
            store,
            cache,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_usage(Arc::new(NoUsage))
    }

    /// Usage checker that flags a fixed id as referenced.
    struct Referenced(String);

    #[async_trait]
    impl UsageChecker for Referenced {
        async fn is_referenced(&self, location_ids: &[String]) -> Result<bool> {
            Ok(location_ids.iter().any(|id| *id == self.0))
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_resets_cache() {
        let f = fixture();
        f.cache.set_children("x", &["y".to_string()]);

        let created = f
            .service
            .create(Location::new("", "Freetown"))
            .await
            .unwrap();
        assert!(!created.id.is_empty());
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_create_blank_name_rejected() {
        let f = fixture();
        let result = f.service.create(Location::new("", "   ")).await;
        assert!(matches!(result.unwrap_err(), LocationError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_create_duplicate_sibling_rejected() {
        let f = fixture();
        f.service
            .create(Location::new("a", "Springfield"))
            .await
            .unwrap();

        let result = f.service.create(Location::new("b", "springfield")).await;
        assert!(matches!(
            result.unwrap_err(),
            LocationError::DuplicateSibling { .. }
        ));
    }

    #[tokio::test]
    async fn test_same_name_under_other_parent_allowed() {
        let f = fixture();
        let p1 = f.service.create(Location::new("p1", "Parent 1")).await.unwrap();
        let p2 = f.service.create(Location::new("p2", "Parent 2")).await.unwrap();

        f.service
            .create(Location::new("c1", "Centerville").with_parent(p1.id))
            .await
            .unwrap();
        f.service
            .create(Location::new("c2", "Centerville").with_parent(p2.id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_synonym_collision_rejected() {
        let f = fixture();
        f.service
            .create(Location::new("a", "Alpha").with_synonyms(vec!["The Capital".to_string()]))
            .await
            .unwrap();

        let result = f
            .service
            .create(Location::new("b", "Beta").with_synonyms(vec!["the capital".to_string()]))
            .await;
        assert!(matches!(
            result.unwrap_err(),
            LocationError::DuplicateSibling { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_own_name() {
        let f = fixture();
        let mut created = f.service.create(Location::new("a", "Lagos")).await.unwrap();
        created.synonyms = vec!["Eko".to_string()];

        // Same name, same record: not a sibling conflict.
        let updated = f.service.update(created).await.unwrap();
        assert_eq!(updated.synonyms, vec!["Eko"]);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let f = fixture();
        let result = f.service.update(Location::new("ghost", "Ghost")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_refused_while_descendant_referenced() {
        let f = fixture_with_usage(Arc::new(Referenced("child".to_string())));
        f.service.create(Location::new("root", "Root")).await.unwrap();
        f.service
            .create(Location::new("child", "Child").with_parent("root"))
            .await
            .unwrap();

        let result = f.service.delete("root").await;
        assert!(matches!(result.unwrap_err(), LocationError::InUse { .. }));
        assert!(f.service.get("root").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_soft_deletes_and_resets() {
        let f = fixture();
        f.service.create(Location::new("root", "Root")).await.unwrap();
        f.cache.set_children("seed", &["x".to_string()]);

        f.service.delete("root").await.unwrap();
        assert!(matches!(
            f.service.get("root").await.unwrap_err(),
            LocationError::NotFound { .. }
        ));
        assert!(f.cache.is_empty());
        // Record still present in storage, only soft-deleted.
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let f = fixture();
        let result = f.service.delete("ghost").await;
        assert!(matches!(
            result.unwrap_err(),
            LocationError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_deactivate_refused_with_active_child() {
        let f = fixture();
        f.service.create(Location::new("root", "Root")).await.unwrap();
        f.service
            .create(Location::new("child", "Child").with_parent("root"))
            .await
            .unwrap();

        let result = f.service.deactivate("root").await;
        assert!(matches!(
            result.unwrap_err(),
            LocationError::ActiveChildren { .. }
        ));
    }

    #[tokio::test]
    async fn test_deactivate_after_children_inactive() {
        let f = fixture();
        f.service.create(Location::new("root", "Root")).await.unwrap();
        f.service
            .create(Location::new("child", "Child").with_parent("root"))
            .await
            .unwrap();

        f.service.deactivate("child").await.unwrap();
        let root = f.service.deactivate("root").await.unwrap();
        assert!(!root.active);
    }

    #[tokio::test]
    async fn test_persist_tree_creates_parents_first() {
        let f = fixture();
        let mut region = HierarchicalNode::new(Location::new("", "Region"));
        region
            .children
            .push(HierarchicalNode::new(Location::new("", "City")));
        let country_children = vec![region];
        let mut country = HierarchicalNode::new(Location::new("", "Country"));
        country.children = country_children;

        let created = f.service.persist_tree(None, &[country]).await.unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(created[0].name, "Country");
        assert_eq!(created[1].name, "Region");
        assert_eq!(
            created[1].parent_location_id.as_ref(),
            Some(&created[0].id)
        );
        assert_eq!(
            created[2].parent_location_id.as_ref(),
            Some(&created[1].id)
        );
    }

    #[tokio::test]
    async fn test_persist_tree_skips_placeholder_subtrees() {
        let f = fixture();
        let mut placeholder = HierarchicalNode::default();
        placeholder
            .children
            .push(HierarchicalNode::new(Location::new("", "Orphan")));
        let real = HierarchicalNode::new(Location::new("", "Real"));

        let created = f
            .service
            .persist_tree(None, &[placeholder, real])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Real");
    }
}
