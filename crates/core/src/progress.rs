//! Progress reports and operation outcomes.

use crate::chunk::ChunkInfo;
use crate::mode::UploadMode;
use crate::session::{MediaKind, SessionId, SessionStatus, UploadSession};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Outcome of sending bytes (a chunk or a whole file) to the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerUploadOutcome {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub progress: u8,
    /// Which chunk this call carried, for chunked uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    /// Chunks still missing, for chunked uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_chunks: Option<u32>,
    /// Whether the file has been fully uploaded and stored.
    pub completed: bool,
}

impl ServerUploadOutcome {
    /// Build an outcome from the session's current state.
    pub fn snapshot(session: &UploadSession, chunk_index: Option<u32>) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            progress: session.progress,
            chunk_index,
            remaining_chunks: session.chunk_info.as_ref().map(|c| c.remaining()),
            completed: session.status == SessionStatus::Completed,
        }
    }
}

/// Outcome of restarting a failed upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryOutcome {
    pub session_id: SessionId,
    pub mode: UploadMode,
    /// Fresh presigned URL for direct mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presigned_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
    pub retry_count: u32,
}

/// Outcome of resuming an interrupted upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResumeOutcome {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub progress: u8,
    pub mode: UploadMode,
    /// Fresh presigned URL for direct mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presigned_url: Option<String>,
    /// Rescanned chunk state; tells the client what is still missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
}

/// Basic progress view of a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadProgress {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub progress: u8,
    pub file_name: String,
    pub file_size: u64,
    pub kind: MediaKind,
    pub mode: UploadMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UploadProgress {
    pub fn from_session(session: &UploadSession) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            progress: session.progress,
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            kind: session.kind,
            mode: session.mode,
            chunk_info: session.chunk_info.clone(),
            retry_count: session.retry_count,
            last_error: session.last_error.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            expires_at: session.expires_at,
        }
    }
}

/// Chunk-level summary for the detailed progress view.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkProgressDetail {
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub uploaded: u32,
    pub failed: u32,
    pub remaining: u32,
    pub uploaded_indices: Vec<u32>,
    pub failed_indices: Vec<u32>,
}

impl ChunkProgressDetail {
    pub fn from_chunk_info(info: &ChunkInfo) -> Self {
        Self {
            total_chunks: info.total_chunks,
            chunk_size: info.chunk_size,
            uploaded: info.uploaded_chunks.len() as u32,
            failed: info.failed_chunks.len() as u32,
            remaining: info.remaining(),
            uploaded_indices: info.uploaded_chunks.iter().copied().collect(),
            failed_indices: info.failed_chunks.iter().copied().collect(),
        }
    }
}

/// Detailed progress view: chunk summary, resumability, and a time estimate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadProgressDetail {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub progress: u8,
    pub file_name: String,
    pub file_size: u64,
    pub kind: MediaKind,
    pub mode: UploadMode,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<ChunkProgressDetail>,
    /// Whether a resume call would currently be accepted.
    pub can_resume: bool,
    /// Naive linear extrapolation from elapsed time and progress. Only
    /// produced for chunked uploads that have made some progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_seconds_remaining: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UploadProgressDetail {
    /// Build the detailed view. `resume_enabled` comes from configuration.
    pub fn from_session(session: &UploadSession, resume_enabled: bool) -> Self {
        let can_resume = resume_enabled && session.status.can_resume() && !session.is_expired();
        Self {
            session_id: session.id,
            status: session.status,
            progress: session.progress,
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            kind: session.kind,
            mode: session.mode,
            retry_count: session.retry_count,
            last_error: session.last_error.clone(),
            chunks: session
                .chunk_info
                .as_ref()
                .map(ChunkProgressDetail::from_chunk_info),
            can_resume,
            estimated_seconds_remaining: estimate_seconds_remaining(
                session,
                OffsetDateTime::now_utc(),
            ),
            created_at: session.created_at,
            updated_at: session.updated_at,
            expires_at: session.expires_at,
        }
    }
}

/// Extrapolate total duration from progress so far and return what's left.
fn estimate_seconds_remaining(session: &UploadSession, now: OffsetDateTime) -> Option<u64> {
    session.chunk_info.as_ref()?;
    if session.progress == 0 {
        return None;
    }
    let elapsed = (now - session.created_at).as_seconds_f64();
    if elapsed <= 0.0 {
        return None;
    }
    let estimated_total = elapsed / (session.progress as f64 / 100.0);
    Some((estimated_total - elapsed).max(0.0).round() as u64)
}
