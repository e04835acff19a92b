//! Store errors.

use thiserror::Error;

/// Failure reading, writing or persisting store rows.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required row is absent.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// Key of the missing row.
        id: String,
    },

    /// Stored data contradicts an invariant the caller relies on.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Snapshot or fixture could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Build an integrity violation.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }
}
