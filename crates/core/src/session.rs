//! Upload session types and lifecycle.

use crate::chunk::ChunkInfo;
use crate::mode::{RequestedMode, UploadMode};
use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::Validation(format!("invalid session ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media being uploaded. Decides size limits and allowed MIME types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload session status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created; waiting for bytes (or a presigned upload) to start.
    Pending,
    /// Bytes are arriving at the server.
    Uploading,
    /// Server-side work in flight: merging chunks or verifying the object.
    Processing,
    /// Finalized; a file record exists.
    Completed,
    /// Something went wrong; `last_error` says what.
    Failed,
    /// Explicitly cancelled by the client.
    Cancelled,
}

impl SessionStatus {
    /// Terminal states never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// States from which the server accepts upload bytes.
    pub fn accepts_bytes(&self) -> bool {
        matches!(self, Self::Pending | Self::Uploading)
    }

    /// States from which a resume is allowed.
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Pending | Self::Uploading | Self::Failed)
    }

    /// States from which confirmation may proceed.
    pub fn can_confirm(&self) -> bool {
        matches!(self, Self::Pending | Self::Uploading | Self::Processing)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Progress reported while a chunked upload is still incomplete is capped
/// here; only a completed session reports 100.
const MAX_INCOMPLETE_PROGRESS: u8 = 99;

/// A resumable upload session.
///
/// Sessions are persisted in the session store and mutated through
/// compare-and-swap on `version`, so concurrent writers cannot silently
/// clobber each other.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Owner; every operation checks this against the caller.
    pub user_id: String,
    /// File name as supplied by the client.
    pub file_name: String,
    /// Declared file size in bytes.
    pub file_size: u64,
    /// Declared MIME type.
    pub content_type: String,
    /// Media kind.
    pub kind: MediaKind,
    /// Logical grouping for the object key.
    pub category: String,
    /// Object store key the file will live under.
    pub object_key: String,
    /// Resolved upload mode.
    pub mode: UploadMode,
    /// Presigned upload URL (direct mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presigned_url: Option<String>,
    /// Staging file path (server mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_path: Option<PathBuf>,
    /// Chunk bookkeeping (chunked server mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Whole-percentage progress, 0..=100.
    pub progress: u8,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// When the session stops being usable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// How many times the client has retried this upload.
    pub retry_count: u32,
    /// Message from the most recent failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// File record created at confirmation. Makes confirm idempotent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_record: Option<FileRecord>,
    /// Store version for compare-and-swap writes.
    #[serde(default)]
    pub version: u64,
}

impl UploadSession {
    /// Create a new pending session from an initialization request.
    pub fn new(
        request: &UploadRequest,
        mode: UploadMode,
        object_key: String,
        expires_in: time::Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: SessionId::new(),
            user_id: request.user_id.clone(),
            file_name: request.file_name.clone(),
            file_size: request.file_size,
            content_type: request.content_type.clone(),
            kind: request.kind,
            category: request.category.clone(),
            object_key,
            mode,
            presigned_url: None,
            staging_path: None,
            chunk_info: None,
            status: SessionStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + expires_in,
            retry_count: 0,
            last_error: None,
            file_record: None,
            version: 0,
        }
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Time left until expiry, or `None` if already expired.
    pub fn remaining_ttl(&self) -> Option<time::Duration> {
        let remaining = self.expires_at - OffsetDateTime::now_utc();
        remaining.is_positive().then_some(remaining)
    }

    /// Bump the updated-at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Recompute progress from chunk bookkeeping. Incomplete uploads are
    /// capped below 100 so only a confirmed session ever reports done.
    pub fn apply_chunk_progress(&mut self) {
        if let Some(chunk) = &self.chunk_info {
            self.progress = chunk.progress_percent().min(MAX_INCOMPLETE_PROGRESS);
        }
    }

    /// Transition to failed, recording the cause.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = SessionStatus::Failed;
        self.last_error = Some(message.into());
        self.touch();
    }

    /// Transition to completed with full progress, clearing any recorded
    /// failure.
    pub fn mark_completed(&mut self) {
        self.status = SessionStatus::Completed;
        self.progress = 100;
        self.last_error = None;
        self.touch();
    }
}

/// Request to initialize an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Owner of the upload.
    pub user_id: String,
    /// File name; sanitized before it reaches the object key.
    pub file_name: String,
    /// Declared size in bytes.
    pub file_size: u64,
    /// Declared MIME type.
    pub content_type: String,
    /// Media kind.
    pub kind: MediaKind,
    /// Logical grouping; defaults to "other".
    #[serde(default = "default_category")]
    pub category: String,
    /// Requested upload mode; defaults to auto.
    #[serde(default)]
    pub mode: RequestedMode,
    /// Per-request chunking override. `None` uses the configured default.
    #[serde(default)]
    pub enable_chunking: Option<bool>,
    /// Session lifetime override in seconds.
    #[serde(default)]
    pub expires_secs: Option<u64>,
}

fn default_category() -> String {
    "other".to_string()
}

/// Response from initializing an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitializedUpload {
    /// The new session's ID.
    pub session_id: SessionId,
    /// Resolved upload mode.
    pub mode: UploadMode,
    /// Presigned URL for direct mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presigned_url: Option<String>,
    /// Chunk layout for chunked server mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
    /// When the session expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// How many chunks the client may upload in parallel.
    pub max_concurrent_chunks: u32,
}
