//! Finalized file records.

use crate::session::MediaKind;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Fields for a file record about to be written to the registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewFileRecord {
    /// Owner of the file.
    pub user_id: String,
    /// File name as stored.
    pub filename: String,
    /// File name as the client supplied it.
    pub original_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Media kind (image, video, audio).
    pub file_type: MediaKind,
    /// Logical grouping, e.g. "ceremony" or "reception".
    pub category: String,
    /// Public URL of the stored object.
    pub url: String,
    /// Object store key.
    pub storage_key: String,
    /// MIME type reported at upload time.
    pub mime_type: String,
}

/// A file record as persisted by the registry after a confirmed upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Registry-assigned identifier.
    pub id: Uuid,
    pub user_id: String,
    pub filename: String,
    pub original_name: String,
    pub file_size: u64,
    pub file_type: MediaKind,
    pub category: String,
    pub url: String,
    pub storage_key: String,
    pub mime_type: String,
    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FileRecord {
    /// Materialize a record from its creation fields.
    pub fn from_new(new: NewFileRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            filename: new.filename,
            original_name: new.original_name,
            file_size: new.file_size,
            file_type: new.file_type,
            category: new.category,
            url: new.url,
            storage_key: new.storage_key,
            mime_type: new.mime_type,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
