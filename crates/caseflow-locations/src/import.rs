//! Pre-write validation pipeline for hierarchical location import batches.
//!
//! The caller flattens the uploaded tree into an [`ImportWorkingSet`] (one
//! entry per distinct id, plus sibling groups keyed by the position-derived
//! parent) and runs [`ImportValidator::pre_validate`] before anything is
//! written. Findings are aggregated across stages and the batch is rejected
//! once with the complete set; only a storage failure aborts early.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use caseflow_core::Location;
use caseflow_storage::{LocationFilter, LocationStore, Page, StorageError};

use crate::config::LocationsConfig;

/// One row of the import file, with its 1-based position for error reporting.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub record_no: usize,
    pub location: Location,
}

/// Everything the batch says about one location id. Several records can
/// claim the same id; that is itself a finding.
#[derive(Debug, Clone, Default)]
pub struct ProcessedEntry {
    pub records: Vec<ImportRecord>,
    /// Parent derived from the record's position in the uploaded tree.
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
}

impl ProcessedEntry {
    fn record_nos(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.record_no).collect()
    }
}

/// Ids sharing one position-derived parent. The `None` group holds the roots.
#[derive(Debug, Clone, Default)]
pub struct SiblingGroup {
    pub children_ids: Vec<String>,
}

/// Flattened view of an import batch, built record by record in file order.
#[derive(Debug, Clone, Default)]
pub struct ImportWorkingSet {
    pub processed: IndexMap<String, ProcessedEntry>,
    pub groups: IndexMap<Option<String>, SiblingGroup>,
}

impl ImportWorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record under its position-derived parent.
    pub fn push_record(
        &mut self,
        record_no: usize,
        location: Location,
        parent_id: Option<String>,
    ) {
        let id = location.id.clone();

        let entry = self.processed.entry(id.clone()).or_default();
        let first_sighting = entry.records.is_empty();
        if first_sighting {
            entry.parent_id = parent_id.clone();
        }
        entry.records.push(ImportRecord {
            record_no,
            location,
        });

        if first_sighting {
            let group = self.groups.entry(parent_id.clone()).or_default();
            group.children_ids.push(id.clone());
            if let Some(parent) = &parent_id
                && let Some(parent_entry) = self.processed.get_mut(parent)
            {
                parent_entry.children_ids.push(id.clone());
            }
            // Children pushed before this id arrived are in its group already.
            if let Some(group) = self.groups.get(&Some(id.clone())) {
                let children = group.children_ids.clone();
                if let Some(entry) = self.processed.get_mut(&id) {
                    entry.children_ids = children;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}

/// Stable rejection codes carried in the `error` field of each finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportFailureCode {
    DuplicateId,
    ParentMismatch,
    InvalidName,
    InvalidSynonyms,
    DuplicateName,
    DuplicateSynonym,
    DbDuplicateName,
    DbDuplicateSynonym,
    ParentMissing,
    ParentLoop,
}

impl ImportFailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateId => "DUPLICATE_ID",
            Self::ParentMismatch => "PARENT_MISMATCH",
            Self::InvalidName => "INVALID_NAME",
            Self::InvalidSynonyms => "INVALID_SYNONYMS",
            Self::DuplicateName => "DUPLICATE_NAME",
            Self::DuplicateSynonym => "DUPLICATE_SYNONYM",
            Self::DbDuplicateName => "DB_DUPLICATE_NAME",
            Self::DbDuplicateSynonym => "DB_DUPLICATE_SYNONYM",
            Self::ParentMissing => "PARENT_MISSING",
            Self::ParentLoop => "PARENT_LOOP",
        }
    }
}

impl std::fmt::Display for ImportFailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding, naming every implicated record.
#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub error: ImportFailureCode,
    #[serde(rename = "recordNo")]
    pub record_nos: Vec<usize>,
    pub message: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import batch rejected with {} finding(s)", failed.len())]
    Failed { failed: Vec<ImportFailure> },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Multi-stage validator over an [`ImportWorkingSet`].
///
/// Stage order: structural checks and intra-file sibling duplicates always
/// both run to completion; the storage-backed stages (persisted duplicates,
/// missing parents, loop detection) each run only while no finding exists
/// yet, since they are meaningless over a batch already known to be broken.
pub struct ImportValidator {
    store: Arc<dyn LocationStore>,
    page_size: usize,
    max_depth: usize,
}

impl ImportValidator {
    pub fn new(store: Arc<dyn LocationStore>, config: &LocationsConfig) -> Self {
        Self {
            store,
            page_size: config.page_size,
            max_depth: config.max_depth,
        }
    }

    /// Validates the whole batch without writing anything.
    pub async fn pre_validate(&self, working: &ImportWorkingSet) -> Result<(), ImportError> {
        let mut failed = Vec::new();

        self.check_structure(working, &mut failed);
        self.check_sibling_duplicates(working, &mut failed);

        if failed.is_empty() {
            self.check_persisted_duplicates(working, &mut failed).await?;
        }

        let mut persisted = HashMap::new();
        if failed.is_empty() {
            persisted = self.resolve_declared_parents(working, &mut failed).await?;
        }

        if failed.is_empty() {
            self.check_parent_loops(working, &persisted, &mut failed);
        }

        if failed.is_empty() {
            debug!(records = working.len(), "import batch validated");
            Ok(())
        } else {
            debug!(findings = failed.len(), "import batch rejected");
            Err(ImportError::Failed { failed })
        }
    }

    /// Stage 1: duplicate ids, declared-vs-derived parent disagreements,
    /// blank names and blank synonym entries.
    fn check_structure(&self, working: &ImportWorkingSet, failed: &mut Vec<ImportFailure>) {
        for (id, entry) in &working.processed {
            if entry.records.len() > 1 {
                failed.push(ImportFailure {
                    error: ImportFailureCode::DuplicateId,
                    record_nos: entry.record_nos(),
                    message: format!(
                        "location id '{id}' appears {} times in the batch",
                        entry.records.len()
                    ),
                    data: json!({ "id": id }),
                });
            }

            for record in &entry.records {
                let location = &record.location;
                if let Some(declared) = &location.parent_location_id
                    && Some(declared) != entry.parent_id.as_ref()
                {
                    failed.push(ImportFailure {
                        error: ImportFailureCode::ParentMismatch,
                        record_nos: vec![record.record_no],
                        message: format!(
                            "record declares parent '{declared}' but is nested under '{}'",
                            entry.parent_id.as_deref().unwrap_or("<root>")
                        ),
                        data: json!({
                            "id": id,
                            "declared": declared,
                            "derived": entry.parent_id,
                        }),
                    });
                }

                if location.name.trim().is_empty() {
                    failed.push(ImportFailure {
                        error: ImportFailureCode::InvalidName,
                        record_nos: vec![record.record_no],
                        message: "location name is blank".to_string(),
                        data: json!({ "id": id }),
                    });
                }

                if location.synonyms.iter().any(|s| s.trim().is_empty()) {
                    failed.push(ImportFailure {
                        error: ImportFailureCode::InvalidSynonyms,
                        record_nos: vec![record.record_no],
                        message: "synonym entries must be non-blank".to_string(),
                        data: json!({ "id": id, "synonyms": location.synonyms }),
                    });
                }
            }
        }
    }

    /// Stage 2: case-insensitive name and synonym collisions within each
    /// sibling group of the batch itself.
    fn check_sibling_duplicates(
        &self,
        working: &ImportWorkingSet,
        failed: &mut Vec<ImportFailure>,
    ) {
        for (parent, group) in &working.groups {
            // value -> contributors (entry id, record numbers, came from name)
            let mut seen: IndexMap<String, Vec<(&str, Vec<usize>, bool)>> = IndexMap::new();
            for child_id in &group.children_ids {
                let Some(entry) = working.processed.get(child_id) else {
                    continue;
                };
                let Some(record) = entry.records.first() else {
                    continue;
                };
                let nos = entry.record_nos();
                let name = record.location.normalized_name();
                if !name.is_empty() {
                    seen.entry(name)
                        .or_default()
                        .push((child_id.as_str(), nos.clone(), true));
                }
                for synonym in record.location.normalized_synonyms() {
                    if synonym.is_empty() {
                        continue;
                    }
                    seen.entry(synonym)
                        .or_default()
                        .push((child_id.as_str(), nos.clone(), false));
                }
            }

            for (value, contributors) in seen {
                let distinct: IndexSet<&str> =
                    contributors.iter().map(|(id, _, _)| *id).collect();
                if distinct.len() < 2 {
                    continue;
                }
                let mut record_nos: Vec<usize> = contributors
                    .iter()
                    .flat_map(|(_, nos, _)| nos.iter().copied())
                    .collect();
                record_nos.sort_unstable();
                record_nos.dedup();
                let all_names = contributors.iter().all(|(_, _, is_name)| *is_name);
                failed.push(ImportFailure {
                    error: if all_names {
                        ImportFailureCode::DuplicateName
                    } else {
                        ImportFailureCode::DuplicateSynonym
                    },
                    record_nos,
                    message: format!(
                        "'{value}' appears more than once under parent '{}'",
                        parent.as_deref().unwrap_or("<root>")
                    ),
                    data: json!({ "value": value, "parentLocationId": parent }),
                });
            }
        }
    }

    /// Stage 3: one paged existence query over non-deleted persisted
    /// locations for the batch's whole name/synonym candidate set, compared
    /// per entry on parent equality (root == root counts) and excluding the
    /// entry's own id.
    async fn check_persisted_duplicates(
        &self,
        working: &ImportWorkingSet,
        failed: &mut Vec<ImportFailure>,
    ) -> Result<(), StorageError> {
        let mut values: IndexSet<String> = IndexSet::new();
        for entry in working.processed.values() {
            if let Some(record) = entry.records.first() {
                values.insert(record.location.normalized_name());
                values.extend(record.location.normalized_synonyms());
            }
        }
        values.retain(|v| !v.is_empty());
        if values.is_empty() {
            return Ok(());
        }

        let filter =
            LocationFilter::new().with_names_or_synonyms_ci(values.into_iter().collect());
        let hits = self.find_all(&filter).await?;
        debug!(hits = hits.len(), "persisted duplicate candidates");

        for hit in &hits {
            let hit_name = hit.normalized_name();
            let hit_values: HashSet<String> = std::iter::once(hit_name.clone())
                .chain(hit.normalized_synonyms())
                .collect();

            for (id, entry) in &working.processed {
                if *id == hit.id || entry.parent_id != hit.parent_location_id {
                    continue;
                }
                let Some(record) = entry.records.first() else {
                    continue;
                };
                let name = record.location.normalized_name();
                if hit_values.contains(&name) {
                    failed.push(ImportFailure {
                        error: ImportFailureCode::DbDuplicateName,
                        record_nos: entry.record_nos(),
                        message: format!(
                            "name '{name}' already exists under the same parent (location '{}')",
                            hit.id
                        ),
                        data: json!({ "value": name, "existingId": hit.id }),
                    });
                }
                for synonym in record.location.normalized_synonyms() {
                    if hit_values.contains(&synonym) {
                        failed.push(ImportFailure {
                            error: ImportFailureCode::DbDuplicateSynonym,
                            record_nos: entry.record_nos(),
                            message: format!(
                                "synonym '{synonym}' already exists under the same parent (location '{}')",
                                hit.id
                            ),
                            data: json!({ "value": synonym, "existingId": hit.id }),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Stage 4: every declared parent absent from the batch must exist in
    /// storage. Persisted parents are then followed upward in batched rounds
    /// so stage 5 can walk complete chains; the known-id set guarantees the
    /// rounds terminate even over cyclic persisted data.
    ///
    /// Returns the gathered persisted `id -> parentLocationId` edges.
    async fn resolve_declared_parents(
        &self,
        working: &ImportWorkingSet,
        failed: &mut Vec<ImportFailure>,
    ) -> Result<HashMap<String, Option<String>>, StorageError> {
        // Which batch records referenced (directly or transitively) each id.
        let mut blame: HashMap<String, Vec<usize>> = HashMap::new();
        let mut frontier: IndexSet<String> = IndexSet::new();
        for entry in working.processed.values() {
            if let Some(parent) = &entry.parent_id
                && !working.processed.contains_key(parent)
            {
                frontier.insert(parent.clone());
                blame
                    .entry(parent.clone())
                    .or_default()
                    .extend(entry.record_nos());
            }
        }

        let mut persisted: HashMap<String, Option<String>> = HashMap::new();
        let mut round = 0;
        while !frontier.is_empty() {
            round += 1;
            let wanted: Vec<String> = frontier.iter().cloned().collect();
            let filter = LocationFilter::new().with_ids(wanted.clone());
            let found = self.find_all(&filter).await?;
            debug!(round, wanted = wanted.len(), found = found.len(), "parent round");

            let mut found_ids: HashSet<&str> = HashSet::new();
            let mut next: IndexSet<String> = IndexSet::new();
            for location in &found {
                found_ids.insert(&location.id);
                persisted.insert(location.id.clone(), location.parent_location_id.clone());
                if let Some(parent) = &location.parent_location_id
                    && !working.processed.contains_key(parent)
                    && !persisted.contains_key(parent)
                {
                    next.insert(parent.clone());
                    let inherited = blame.get(&location.id).cloned().unwrap_or_default();
                    blame.entry(parent.clone()).or_default().extend(inherited);
                }
            }

            for id in &wanted {
                if !found_ids.contains(id.as_str()) {
                    let mut record_nos = blame.get(id).cloned().unwrap_or_default();
                    record_nos.sort_unstable();
                    record_nos.dedup();
                    failed.push(ImportFailure {
                        error: ImportFailureCode::ParentMissing,
                        record_nos,
                        message: format!("referenced parent location '{id}' does not exist"),
                        data: json!({ "parentLocationId": id }),
                    });
                }
            }

            frontier = next;
        }

        Ok(persisted)
    }

    /// Stage 5: per entry, iterative walk up the parent chain (batch entries
    /// first, stage-4 persisted edges second) with a per-walk visited set.
    /// A revisit is a loop; each distinct cycle is reported once, naming
    /// every batch record on it.
    fn check_parent_loops(
        &self,
        working: &ImportWorkingSet,
        persisted: &HashMap<String, Option<String>>,
        failed: &mut Vec<ImportFailure>,
    ) {
        let mut reported: HashSet<String> = HashSet::new();

        for (id, entry) in &working.processed {
            let mut chain: Vec<String> = vec![id.clone()];
            let mut seen: HashSet<String> = HashSet::new();
            seen.insert(id.clone());
            let mut cursor = entry.parent_id.clone();

            while let Some(parent) = cursor {
                if !seen.insert(parent.clone()) {
                    let start = chain.iter().position(|c| *c == parent).unwrap_or(0);
                    let cycle: Vec<String> = chain[start..].to_vec();
                    if !cycle.iter().any(|c| reported.contains(c)) {
                        reported.extend(cycle.iter().cloned());
                        let mut record_nos: Vec<usize> = cycle
                            .iter()
                            .filter_map(|c| working.processed.get(c))
                            .flat_map(|e| e.record_nos())
                            .collect();
                        if record_nos.is_empty() {
                            record_nos = entry.record_nos();
                        }
                        record_nos.sort_unstable();
                        record_nos.dedup();
                        failed.push(ImportFailure {
                            error: ImportFailureCode::ParentLoop,
                            record_nos,
                            message: format!(
                                "parent reference loop: {} -> {parent}",
                                chain.join(" -> ")
                            ),
                            data: json!({ "chain": cycle }),
                        });
                    }
                    break;
                }

                if chain.len() > self.max_depth {
                    failed.push(ImportFailure {
                        error: ImportFailureCode::ParentLoop,
                        record_nos: entry.record_nos(),
                        message: format!(
                            "parent chain of '{id}' exceeds {} levels",
                            self.max_depth
                        ),
                        data: json!({ "id": id, "maxDepth": self.max_depth }),
                    });
                    break;
                }

                chain.push(parent.clone());
                cursor = match working.processed.get(&parent) {
                    Some(parent_entry) => parent_entry.parent_id.clone(),
                    None => persisted.get(&parent).cloned().flatten(),
                };
            }
        }
    }

    async fn find_all(&self, filter: &LocationFilter) -> Result<Vec<Location>, StorageError> {
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
}

impl std::fmt::Debug for ImportValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportValidator")
            .field("backend", &self.store.backend_name())
            .field("page_size", &self.page_size)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
