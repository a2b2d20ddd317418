//! Core error types.

use thiserror::Error;

/// Core errors.
///
/// Every error is scoped to the operation that raised it: nothing is partially
/// applied and the catalog stays usable afterwards.
#[derive(Debug, Error)]
pub enum Error {
    /// A strict catalog was asked to hold a definition outside its CatalogDef.
    #[error("strict violation: {0}")]
    StrictViolation(String),

    /// A name that must be unique is already taken.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName {
        /// What kind of thing collided (aspect def, property, hierarchy, ...).
        kind: &'static str,
        /// The colliding name.
        name: String,
    },

    /// Lookup by id or name found nothing.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What kind of thing was looked up.
        kind: &'static str,
        /// The name or id that was looked up.
        name: String,
    },

    /// A value or aspect does not fit the definition it is checked against.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A membership references an entity that does not exist.
    #[error("referential integrity: {0}")]
    ReferentialIntegrity(String),

    /// The definition flags forbid the operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Optimistic concurrency check failed.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the caller read.
        expected: u64,
        /// Version currently held.
        actual: u64,
    },

    /// Invalid input that fits none of the above.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(kind: &'static str, name: impl ToString) -> Self {
        Error::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    /// Create a duplicate-name error.
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            kind,
            name: name.into(),
        }
    }
}
