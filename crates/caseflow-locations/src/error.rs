use caseflow_core::ErrorCategory;
use caseflow_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the resolver, the transformer and the location service.
///
/// Cycles in persisted parent references are integrity errors everywhere in
/// this crate, matching the import validator's `PARENT_LOOP` rejection.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Location not found: {id}")]
    NotFound { id: String },

    #[error("Parent reference loop detected at location {id}")]
    ParentLoop { id: String },

    #[error("Hierarchy deeper than the configured bound of {max} levels")]
    DepthExceeded { max: usize },

    #[error("Duplicate name or synonym '{value}' within sibling group of {parent}")]
    DuplicateSibling { value: String, parent: String },

    #[error("Location {id} still has active children")]
    ActiveChildren { id: String },

    #[error("Location {id} or one of its descendants is still referenced")]
    InUse { id: String },

    #[error("Invalid location data: {message}")]
    Invalid { message: String },
}

impl LocationError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn parent_loop(id: impl Into<String>) -> Self {
        Self::ParentLoop { id: id.into() }
    }

    pub fn depth_exceeded(max: usize) -> Self {
        Self::DepthExceeded { max }
    }

    pub fn duplicate_sibling(value: impl Into<String>, parent: Option<&str>) -> Self {
        Self::DuplicateSibling {
            value: value.into(),
            parent: parent.unwrap_or("<root>").to_string(),
        }
    }

    pub fn active_children(id: impl Into<String>) -> Self {
        Self::ActiveChildren { id: id.into() }
    }

    pub fn in_use(id: impl Into<String>) -> Self {
        Self::InUse { id: id.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Get the error category for logging/monitoring.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage(err) => err.category(),
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::ParentLoop { .. } | Self::DepthExceeded { .. } => ErrorCategory::Integrity,
            Self::DuplicateSibling { .. } | Self::ActiveChildren { .. } | Self::InUse { .. } => {
                ErrorCategory::Conflict
            }
            Self::Invalid { .. } => ErrorCategory::Validation,
        }
    }
}

/// Convenience result type for location operations.
pub type Result<T> = std::result::Result<T, LocationError>;
