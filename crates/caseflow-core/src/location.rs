use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A coded identifier attached to a location (e.g. an ISO or national
/// administrative code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationIdentifier {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Geographic coordinates, passed through unchanged by this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A node in the forest of geographic areas, linked by `parentLocationId`.
///
/// `name` and `synonyms` must be unique case-insensitively among all locations
/// sharing the same `parentLocationId` (including the no-parent root group).
/// The invariant is enforced by the location service before every write and by
/// the import validator before any import is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub synonyms: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub identifiers: Vec<LocationIdentifier>,
    #[serde(rename = "parentLocationId", skip_serializing_if = "Option::is_none")]
    pub parent_location_id: Option<String>,
    #[serde(rename = "geoLocation", skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoPoint>,
    #[serde(
        rename = "geographicalLevelId",
        skip_serializing_if = "Option::is_none"
    )]
    pub geographical_level_id: Option<String>,
    pub active: bool,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Soft-delete marker; deleted records are excluded from queries unless a
    /// filter explicitly includes them.
    #[serde(
        rename = "deletedAt",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            name: name.into(),
            synonyms: Vec::new(),
            identifiers: Vec::new(),
            parent_location_id: None,
            geo_location: None,
            geographical_level_id: None,
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_location_id = Some(parent_id.into());
        self
    }

    pub fn with_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_identifiers(mut self, identifiers: Vec<LocationIdentifier>) -> Self {
        self.identifiers = identifiers;
        self
    }

    pub fn with_geo_location(mut self, lat: f64, lng: f64) -> Self {
        self.geo_location = Some(GeoPoint { lat, lng });
        self
    }

    pub fn with_geographical_level(mut self, level: impl Into<String>) -> Self {
        self.geographical_level_id = Some(level.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Case-folded name, the unit of sibling-group uniqueness comparison.
    pub fn normalized_name(&self) -> String {
        self.name.trim().to_lowercase()
    }

    /// Case-folded synonyms.
    pub fn normalized_synonyms(&self) -> Vec<String> {
        self.synonyms
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn mark_deleted(&mut self) {
        let now = OffsetDateTime::now_utc();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}
