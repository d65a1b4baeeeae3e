//! Metadata store error types.

use thiserror::Error;

/// Errors from session store and file registry operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A compare-and-swap write lost the race: the stored session moved on
    /// while the caller held version `expected`.
    #[error("version conflict on session {id}: stored version is no longer {expected}")]
    VersionConflict { id: String, expected: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
