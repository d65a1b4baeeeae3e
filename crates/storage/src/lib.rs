//! Object storage abstraction for uploaded wedding media.
//!
//! This crate provides:
//! - The [`ObjectStore`] trait the upload coordinator is written against:
//!   presigned uploads, atomic puts, existence checks, metadata, deletes
//! - A local filesystem backend with atomic writes and informational
//!   presigned URLs

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{MAX_PRESIGN_EXPIRY, MIN_PRESIGN_EXPIRY, ObjectInfo, ObjectStore};
