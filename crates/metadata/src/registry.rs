//! File registry contract.

use crate::error::MetadataResult;
use async_trait::async_trait;
use hoist_core::record::{FileRecord, NewFileRecord};
use uuid::Uuid;

/// Registry of finalized uploads.
///
/// Exactly one record is written per confirmed upload; the registry assigns
/// the record ID and creation timestamp.
#[async_trait]
pub trait FileRegistry: Send + Sync {
    /// Persist a new file record, returning it with identity assigned.
    async fn create_file_record(&self, new: NewFileRecord) -> MetadataResult<FileRecord>;

    /// Fetch a record by ID.
    async fn get_file_record(&self, id: Uuid) -> MetadataResult<Option<FileRecord>>;
}
