//! Configuration for the location subsystem.
//!
//! Loaded from an optional TOML file with `CASEFLOW_`-prefixed environment
//! overrides (e.g. `CASEFLOW_LOCATIONS__CACHE_ENABLED=false`).

use caseflow_core::CoreError;
use serde::{Deserialize, Serialize};

/// Default page size for batched storage scans.
///
/// Bounds every traversal round's result set; rounds run strictly
/// sequentially, so this is also the upper bound on rows in flight.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Default bound on hierarchy depth for iterative walks.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationsConfig {
    /// Whether the sub-location cache memoizes at all. When false every
    /// resolution falls through to storage.
    pub cache_enabled: bool,
    /// Page size for batched parent→children storage queries.
    pub page_size: usize,
    /// Maximum hierarchy depth tolerated by resolver and validator walks.
    pub max_depth: usize,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            page_size: DEFAULT_PAGE_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl LocationsConfig {
    /// Loads configuration from an optional TOML file and the environment.
    ///
    /// File values override defaults; `CASEFLOW_LOCATIONS__*` environment
    /// variables override both.
    pub fn load(path: Option<&str>) -> Result<Self, CoreError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("CASEFLOW_LOCATIONS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|err| CoreError::configuration(err.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|err| CoreError::configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.page_size == 0 {
            return Err(CoreError::configuration("page_size must be positive"));
        }
        if self.max_depth == 0 {
            return Err(CoreError::configuration("max_depth must be positive"));
        }
        Ok(())
    }
}
