//! Storage abstraction for the Caseflow location collection.
//!
//! The rest of the system consumes persistence through the narrow
//! [`LocationStore`] trait: filtered, paged `find`/`count` plus plain CRUD.
//! Query execution itself is opaque to callers; backends decide how filters
//! are evaluated.

pub mod error;
pub mod traits;
pub mod types;

pub use error::StorageError;
pub use traits::LocationStore;
pub use types::{LocationFilter, Page};
