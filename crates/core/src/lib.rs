//! Core domain types and shared logic for the hoist upload pipeline.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session lifecycle and identifiers
//! - Chunk bookkeeping for resumable server uploads
//! - Upload mode selection (direct vs server)
//! - Retry policies, backoff, and circuit breaker settings
//! - Object key generation
//! - File records and progress reports
//! - Pipeline configuration

pub mod chunk;
pub mod config;
pub mod error;
pub mod mode;
pub mod object_key;
pub mod progress;
pub mod record;
pub mod retry;
pub mod session;

pub use chunk::ChunkInfo;
pub use config::UploadConfig;
pub use error::{Error, Result};
pub use mode::{RequestedMode, UploadMode, select_mode};
pub use object_key::{object_key, sanitize_file_name};
pub use progress::{
    ResumeOutcome, RetryOutcome, ServerUploadOutcome, UploadProgress, UploadProgressDetail,
};
pub use record::{FileRecord, NewFileRecord};
pub use retry::{Backoff, BreakerSettings, RetryPolicy};
pub use session::{
    InitializedUpload, MediaKind, SessionId, SessionStatus, UploadRequest, UploadSession,
};

/// Default chunk size: 5 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Minimum chunk size: 1 MiB
pub const MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Longest accepted file name, in characters.
pub const MAX_FILE_NAME_LEN: usize = 255;
