//! Query types for the location storage abstraction.

use serde::{Deserialize, Serialize};

/// Filter over the location collection. All set conditions are ANDed.
///
/// Soft-deleted records are excluded unless `include_deleted` is set;
/// everything else is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFilter {
    /// Match only these ids (`inq`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Exclude these ids (`nin`); round-based traversal uses this as its
    /// "not already retrieved" condition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_ids: Option<Vec<String>>,
    /// Match locations whose `parentLocationId` is in this set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ids: Option<Vec<String>>,
    /// Case-insensitive exact match against `name` or any `synonyms` element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names_or_synonyms_ci: Option<Vec<String>>,
    /// Match on the `active` flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Include soft-deleted records.
    #[serde(default)]
    pub include_deleted: bool,
}

impl LocationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_exclude_ids(mut self, ids: Vec<String>) -> Self {
        self.exclude_ids = Some(ids);
        self
    }

    pub fn with_parent_ids(mut self, parent_ids: Vec<String>) -> Self {
        self.parent_ids = Some(parent_ids);
        self
    }

    pub fn with_names_or_synonyms_ci(mut self, values: Vec<String>) -> Self {
        self.names_or_synonyms_ci = Some(values);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Overlay the set conditions of `other` onto a copy of this filter.
    ///
    /// Used by the resolver to merge a caller-supplied detail filter (e.g.
    /// "active only") into its traversal queries.
    #[must_use]
    pub fn merged_with(&self, other: &LocationFilter) -> Self {
        let mut merged = self.clone();
        if other.ids.is_some() {
            merged.ids = other.ids.clone();
        }
        if other.exclude_ids.is_some() {
            merged.exclude_ids = other.exclude_ids.clone();
        }
        if other.parent_ids.is_some() {
            merged.parent_ids = other.parent_ids.clone();
        }
        if other.names_or_synonyms_ci.is_some() {
            merged.names_or_synonyms_ci = other.names_or_synonyms_ci.clone();
        }
        if other.active.is_some() {
            merged.active = other.active;
        }
        merged.include_deleted = merged.include_deleted || other.include_deleted;
        merged
    }
}

/// Pagination window for `find`.
///
/// Results are ordered by creation time (then id) so that paging is
/// deterministic across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// First page with the given limit.
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    /// The page immediately after this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = LocationFilter::new()
            .with_parent_ids(vec!["a".into(), "b".into()])
            .with_active(true);
        assert_eq!(filter.parent_ids.as_ref().unwrap().len(), 2);
        assert_eq!(filter.active, Some(true));
        assert!(!filter.include_deleted);
    }

    #[test]
    fn test_filter_merge() {
        let base = LocationFilter::new().with_parent_ids(vec!["a".into()]);
        let extra = LocationFilter::new().with_active(true);
        let merged = base.merged_with(&extra);
        assert_eq!(merged.parent_ids.as_ref().unwrap(), &vec!["a".to_string()]);
        assert_eq!(merged.active, Some(true));

        // The overlay wins where both are set.
        let override_parents = LocationFilter::new().with_parent_ids(vec!["b".into()]);
        let merged = base.merged_with(&override_parents);
        assert_eq!(merged.parent_ids.as_ref().unwrap(), &vec!["b".to_string()]);
    }

    #[test]
    fn test_page_next() {
        let page = Page::first(10_000);
        assert_eq!(page.offset, 0);
        let next = page.next();
        assert_eq!(next.offset, 10_000);
        assert_eq!(next.limit, 10_000);
    }
}
