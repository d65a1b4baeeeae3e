//! Maps storage and metadata errors onto the pipeline error taxonomy.
//!
//! The mapping decides retryability, so it lives in one place: transient
//! infrastructure trouble stays retryable, caller mistakes become validation
//! errors, and anything that cannot heal by waiting is permanent.

use hoist_core::Error;
use hoist_metadata::MetadataError;
use hoist_storage::StorageError;

pub(crate) fn storage_error(err: StorageError) -> Error {
    match err {
        StorageError::NotFound(key) => Error::Transient(format!("object not found: {key}")),
        StorageError::Unavailable(msg) => Error::Transient(msg),
        StorageError::Io(err) => Error::Io(err),
        StorageError::InvalidKey(msg) => Error::Validation(msg),
        StorageError::InvalidExpiry(msg) => Error::Validation(msg),
        StorageError::Config(msg) => Error::Permanent(msg),
    }
}

pub(crate) fn metadata_error(err: MetadataError) -> Error {
    match err {
        MetadataError::NotFound(id) => Error::SessionNotFound(id),
        MetadataError::AlreadyExists(id) => {
            Error::Permanent(format!("session id collision: {id}"))
        }
        conflict @ MetadataError::VersionConflict { .. } => Error::Transient(conflict.to_string()),
        MetadataError::Serialization(err) => {
            Error::Permanent(format!("session serialization failed: {err}"))
        }
        MetadataError::Database(err) => {
            Error::Transient(format!("session store unavailable: {err}"))
        }
        MetadataError::Io(err) => Error::Io(err),
    }
}
