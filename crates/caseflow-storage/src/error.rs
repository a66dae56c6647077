//! Storage error types for the location storage abstraction layer.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested location was not found.
    #[error("Location not found: {id}")]
    NotFound {
        /// The ID of the location that was not found.
        id: String,
    },

    /// Attempted to create a location that already exists.
    #[error("Location already exists: {id}")]
    AlreadyExists {
        /// The ID of the location that already exists.
        id: String,
    },

    /// The location data is invalid.
    #[error("Invalid location: {message}")]
    InvalidLocation {
        /// Description of why the location is invalid.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal storage error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Creates a new `InvalidLocation` error.
    #[must_use]
    pub fn invalid_location(message: impl Into<String>) -> Self {
        Self::InvalidLocation {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the error category for logging/monitoring.
    pub fn category(&self) -> caseflow_core::ErrorCategory {
        match self {
            Self::NotFound { .. } => caseflow_core::ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => caseflow_core::ErrorCategory::Conflict,
            Self::InvalidLocation { .. } => caseflow_core::ErrorCategory::Validation,
            Self::Internal { .. } => caseflow_core::ErrorCategory::Internal,
        }
    }
}
