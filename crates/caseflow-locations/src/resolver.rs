//! Batched, cycle-safe traversal of the location forest.
//!
//! All expansion is round-based: each round issues one paged storage query
//! for the whole frontier, and rounds run strictly sequentially because the
//! next frontier depends on the previous round's discoveries. Storage errors
//! propagate unchanged; there is no retry at this layer.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use caseflow_core::Location;
use caseflow_storage::{LocationFilter, LocationStore, Page};

use crate::cache::SubLocationCache;
use crate::config::LocationsConfig;
use crate::error::{LocationError, Result};

/// Expands seed sets of location ids into full descendant or ancestor sets.
///
/// The id-only descendant path goes through the [`SubLocationCache`]; the
/// full-record variants always query storage directly.
pub struct LocationResolver {
    store: Arc<dyn LocationStore>,
    cache: Arc<SubLocationCache>,
    page_size: usize,
    max_depth: usize,
}

impl LocationResolver {
    pub fn new(
        store: Arc<dyn LocationStore>,
        cache: Arc<SubLocationCache>,
        config: &LocationsConfig,
    ) -> Self {
        Self {
            store,
            cache,
            page_size: config.page_size,
            max_depth: config.max_depth,
        }
    }

    /// Resolves the set of ids reachable from `seed_ids` via child edges,
    /// seeds included, each id exactly once.
    ///
    /// Known edges are expanded through the cache without I/O; unknown ones
    /// are resolved in paged storage rounds that also feed the cache. A seed
    /// rediscovered along a chain that does not pass through it is a normal
    /// seed overlap; an id rediscovered along its own descendant chain is a
    /// parent-reference loop and surfaces as an integrity error.
    pub async fn resolve_descendants(&self, seed_ids: &[String]) -> Result<Vec<String>> {
        let mut resolved: IndexSet<String> = seed_ids.iter().cloned().collect();
        // Discovery edges (child -> parent it was found under), kept so a
        // rediscovery can be classified as overlap or loop.
        let mut discovered_via: HashMap<String, String> = HashMap::new();
        let mut pending: Vec<String> = resolved.iter().cloned().collect();

        let mut depth = 0;
        while !pending.is_empty() {
            if depth >= self.max_depth {
                return Err(LocationError::depth_exceeded(self.max_depth));
            }
            depth += 1;

            // Expand everything the cache already knows, collecting the ids
            // whose children are still unknown.
            let mut misses: Vec<String> = Vec::new();
            let mut stack = pending;
            let mut next: Vec<String> = Vec::new();
            while let Some(id) = stack.pop() {
                match self.cache.children(&id) {
                    Some(children) => {
                        for child in children {
                            self.admit(
                                &child,
                                &id,
                                &mut resolved,
                                &mut discovered_via,
                                &mut stack,
                            )?;
                        }
                    }
                    None => misses.push(id),
                }
            }

            if misses.is_empty() {
                break;
            }

            // Mark the misses before querying so a concurrent resolution of
            // the same ids sees an entry instead of re-issuing the scan.
            for id in &misses {
                self.cache.mark_resolving(id);
            }

            debug!(round = depth, frontier = misses.len(), "descendant round");
            let filter = LocationFilter::new().with_parent_ids(misses);
            let mut page = Page::first(self.page_size);
            loop {
                let batch = self.store.find(&filter, &page).await?;
                let batch_len = batch.len();
                for child in batch {
                    let parent = child
                        .parent_location_id
                        .clone()
                        .unwrap_or_default();
                    self.cache
                        .set_children(&parent, std::slice::from_ref(&child.id));
                    self.admit(
                        &child.id,
                        &parent,
                        &mut resolved,
                        &mut discovered_via,
                        &mut next,
                    )?;
                }
                if batch_len < page.limit {
                    break;
                }
                page = page.next();
            }

            pending = next;
        }

        Ok(resolved.into_iter().collect())
    }

    /// Records a discovered child, queueing it for further expansion, or
    /// classifies a rediscovery.
    fn admit(
        &self,
        child: &str,
        parent: &str,
        resolved: &mut IndexSet<String>,
        discovered_via: &mut HashMap<String, String>,
        queue: &mut Vec<String>,
    ) -> Result<()> {
        if resolved.insert(child.to_string()) {
            discovered_via.insert(child.to_string(), parent.to_string());
            queue.push(child.to_string());
            return Ok(());
        }

        // Walk the discovery chain of the parent back to its seed. If the
        // rediscovered id sits on that chain, the persisted data loops.
        let mut chain = vec![parent.to_string()];
        let mut cursor = parent;
        while let Some(via) = discovered_via.get(cursor) {
            chain.push(via.clone());
            cursor = via;
        }
        if chain.iter().any(|id| id == child) {
            warn!(id = child, ?chain, "parent reference loop in location data");
            return Err(LocationError::parent_loop(child));
        }
        // Seed overlap: one seed is a descendant of another.
        Ok(())
    }

    /// Uncached full-record descendant expansion, used when more than ids are
    /// needed. `extra` is merged into every storage query (e.g. active-only).
    ///
    /// Every round excludes everything already retrieved, so cyclic data
    /// cannot re-enter the accumulator and the walk terminates.
    pub async fn resolve_descendants_with_details(
        &self,
        seed_ids: &[String],
        extra: Option<&LocationFilter>,
    ) -> Result<Vec<Location>> {
        let mut retrieved: IndexMap<String, Location> = IndexMap::new();

        let seed_filter = self.merged(
            extra,
            LocationFilter::new().with_ids(seed_ids.to_vec()),
        );
        let seeds = self.find_all(&seed_filter).await?;
        let mut frontier: Vec<String> = Vec::with_capacity(seeds.len());
        for location in seeds {
            frontier.push(location.id.clone());
            retrieved.insert(location.id.clone(), location);
        }

        let mut depth = 0;
        while !frontier.is_empty() {
            if depth >= self.max_depth {
                return Err(LocationError::depth_exceeded(self.max_depth));
            }
            depth += 1;

            let filter = self.merged(
                extra,
                LocationFilter::new()
                    .with_parent_ids(frontier)
                    .with_exclude_ids(retrieved.keys().cloned().collect()),
            );
            let batch = self.find_all(&filter).await?;
            debug!(round = depth, discovered = batch.len(), "detail round");

            let mut next = Vec::with_capacity(batch.len());
            for location in batch {
                if retrieved.contains_key(&location.id) {
                    warn!(id = %location.id, "duplicate child in detail round, skipping");
                    continue;
                }
                next.push(location.id.clone());
                retrieved.insert(location.id.clone(), location);
            }
            frontier = next;
        }

        Ok(retrieved.into_values().collect())
    }

    /// Walks `parentLocationId` upward, retrieving the seeds and every
    /// ancestor, stopping when a round retrieves nothing new.
    ///
    /// Already-retrieved ids are never re-fetched, so cyclic parent chains
    /// terminate naturally once the loop closes.
    pub async fn resolve_ancestors_with_details(
        &self,
        seed_ids: &[String],
        extra: Option<&LocationFilter>,
    ) -> Result<Vec<Location>> {
        let mut retrieved: IndexMap<String, Location> = IndexMap::new();
        let mut wanted: IndexSet<String> = seed_ids.iter().cloned().collect();

        let mut depth = 0;
        loop {
            let unfetched: Vec<String> = wanted
                .iter()
                .filter(|id| !retrieved.contains_key(*id))
                .cloned()
                .collect();
            if unfetched.is_empty() {
                break;
            }
            if depth >= self.max_depth {
                return Err(LocationError::depth_exceeded(self.max_depth));
            }
            depth += 1;

            let filter = self.merged(extra, LocationFilter::new().with_ids(unfetched));
            let batch = self.find_all(&filter).await?;
            if batch.is_empty() {
                // Referenced ids that do not exist; nothing further upward.
                break;
            }
            debug!(round = depth, retrieved = batch.len(), "ancestor round");

            wanted = IndexSet::new();
            for location in batch {
                if let Some(parent) = &location.parent_location_id
                    && !retrieved.contains_key(parent)
                {
                    wanted.insert(parent.clone());
                }
                retrieved.insert(location.id.clone(), location);
            }
        }

        Ok(retrieved.into_values().collect())
    }

    /// Drains every page matching `filter`.
    async fn find_all(&self, filter: &LocationFilter) -> Result<Vec<Location>> {
        let mut results = Vec::new();
        let mut page = Page::first(self.page_size);
        loop {
            let batch = self.store.find(filter, &page).await?;
            let batch_len = batch.len();
            results.extend(batch);
            if batch_len < page.limit {
                return Ok(results);
            }
            page = page.next();
        }
    }

    fn merged(&self, extra: Option<&LocationFilter>, base: LocationFilter) -> LocationFilter {
        match extra {
            // The traversal's id conditions always win over the caller's.
            Some(extra) => extra.merged_with(&base),
            None => base,
        }
    }
}

impl std::fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("backend", &self.store.backend_name())
            .field("page_size", &self.page_size)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
