//! Chunk staging and assembly for server-mode uploads.
//!
//! Chunks land as individual artifacts next to the session's staging path
//! (`{staging}.chunk.{index}`), written atomically so a crash never leaves a
//! half-written chunk that a resume scan would trust. Once every chunk is
//! present the assembler streams them in index order into one object and
//! uploads it; artifacts are discarded only after the upload succeeds, so a
//! failed merge can always be resumed.

use crate::classify;
use crate::executor::RetryExecutor;
use bytes::{Bytes, BytesMut};
use hoist_core::retry::RetryPolicy;
use hoist_core::sanitize_file_name;
use hoist_core::session::{SessionId, UploadSession};
use hoist_core::{Error, Result};
use hoist_storage::ObjectStore;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Writes, scans, and merges chunk artifacts for one coordinator.
pub struct ChunkAssembler {
    store: Arc<dyn ObjectStore>,
    executor: Arc<RetryExecutor>,
}

impl ChunkAssembler {
    pub fn new(store: Arc<dyn ObjectStore>, executor: Arc<RetryExecutor>) -> Self {
        Self { store, executor }
    }

    /// Staging path for a session's file: `{temp_dir}/{session_id}_{name}`.
    pub fn staging_path(temp_dir: &Path, id: SessionId, file_name: &str) -> PathBuf {
        temp_dir.join(format!("{id}_{}", sanitize_file_name(file_name)))
    }

    /// Path of one chunk artifact: `{staging}.chunk.{index}`.
    fn chunk_path(staging: &Path, index: u32) -> PathBuf {
        let mut os = staging.as_os_str().to_os_string();
        os.push(format!(".chunk.{index}"));
        PathBuf::from(os)
    }

    /// Validate and persist one chunk artifact.
    ///
    /// Re-writing an index that already landed just replaces the artifact.
    /// Session bookkeeping is the caller's job; this only touches disk.
    pub async fn write_chunk(
        &self,
        session: &UploadSession,
        index: u32,
        data: &Bytes,
    ) -> Result<()> {
        let info = session.chunk_info.as_ref().ok_or_else(|| {
            Error::Validation(format!(
                "session {} was not initialized for chunked upload",
                session.id
            ))
        })?;
        let staging = session.staging_path.as_ref().ok_or_else(|| {
            Error::Validation(format!("session {} has no staging path", session.id))
        })?;
        if !info.contains_index(index) {
            return Err(Error::Validation(format!(
                "chunk index {index} out of range for {} chunks",
                info.total_chunks
            )));
        }

        let target = Self::chunk_path(staging, index);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a uniquely named temp file, fsync, then rename. Resume
        // scans treat artifact presence as proof the chunk landed intact.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = target.with_file_name(
            target
                .file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &target).await?;

        debug!(
            session_id = %session.id,
            chunk = index,
            size = data.len(),
            "chunk artifact staged"
        );
        Ok(())
    }

    /// Merge all chunk artifacts in index order and upload the result under
    /// the session's object key. Artifacts are discarded only after the
    /// upload succeeds. Returns the merged size in bytes.
    pub async fn merge_and_store(
        &self,
        session: &UploadSession,
        policy: &RetryPolicy,
    ) -> Result<u64> {
        let info = session.chunk_info.as_ref().ok_or_else(|| {
            Error::Validation(format!("session {} has no chunks to merge", session.id))
        })?;
        let staging = session.staging_path.as_ref().ok_or_else(|| {
            Error::Validation(format!("session {} has no staging path", session.id))
        })?;

        let capacity = usize::try_from(session.file_size).unwrap_or_default();
        let mut merged = BytesMut::with_capacity(capacity);
        for index in 0..info.total_chunks {
            let path = Self::chunk_path(staging, index);
            let data = fs::read(&path).await?;
            merged.extend_from_slice(&data);
        }
        let merged = merged.freeze();
        let size = merged.len() as u64;

        let store = self.store.clone();
        let key = session.object_key.clone();
        self.executor
            .execute("upload-merged-file", policy, move || {
                let store = store.clone();
                let key = key.clone();
                let data = merged.clone();
                async move { store.put(&key, data).await.map_err(classify::storage_error) }
            })
            .await?;

        self.discard_artifacts(session).await;
        Ok(size)
    }

    /// Rebuild chunk bookkeeping from what is actually on disk.
    ///
    /// A present artifact counts as uploaded whether or not it was recorded;
    /// a recorded chunk whose artifact went missing is marked failed so the
    /// client knows to re-send it. Returns false for sessions with nothing
    /// to scan.
    pub async fn rescan(&self, session: &mut UploadSession) -> Result<bool> {
        let state = (&session.chunk_info, &session.staging_path);
        let (total, previously_uploaded, staging) = match state {
            (Some(info), Some(staging)) => (
                info.total_chunks,
                info.uploaded_chunks.clone(),
                staging.clone(),
            ),
            _ => return Ok(false),
        };

        let mut uploaded = BTreeSet::new();
        let mut failed = BTreeSet::new();
        for index in 0..total {
            let present = matches!(
                fs::try_exists(Self::chunk_path(&staging, index)).await,
                Ok(true)
            );
            if present {
                uploaded.insert(index);
            } else if previously_uploaded.contains(&index) {
                failed.insert(index);
            }
        }

        debug!(
            session_id = %session.id,
            found = uploaded.len(),
            missing = failed.len(),
            total,
            "rescanned chunk artifacts"
        );
        if let Some(info) = session.chunk_info.as_mut() {
            info.uploaded_chunks = uploaded;
            info.failed_chunks = failed;
        }
        session.apply_chunk_progress();
        Ok(true)
    }

    /// Remove every staging artifact the session may have left behind.
    /// Best-effort: missing files are expected, anything else is logged.
    pub async fn discard_artifacts(&self, session: &UploadSession) {
        if let (Some(info), Some(staging)) = (&session.chunk_info, &session.staging_path) {
            for index in 0..info.total_chunks {
                remove_quietly(&Self::chunk_path(staging, index)).await;
            }
        }
        if let Some(staging) = &session.staging_path {
            remove_quietly(staging).await;
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove staging artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::chunk::ChunkInfo;
    use hoist_core::mode::{RequestedMode, UploadMode};
    use hoist_core::session::{MediaKind, UploadRequest};
    use hoist_storage::FilesystemBackend;
    use tempfile::TempDir;

    fn upload_policy() -> RetryPolicy {
        RetryPolicy::upload().with_attempts(0)
    }

    async fn assembler(store_dir: &TempDir) -> ChunkAssembler {
        let backend = FilesystemBackend::new(store_dir.path()).await.unwrap();
        ChunkAssembler::new(Arc::new(backend), Arc::new(RetryExecutor::new()))
    }

    fn chunked_session(staging_dir: &Path, total_chunks: u32, chunk_size: u64) -> UploadSession {
        let request = UploadRequest {
            user_id: "user-1".into(),
            file_name: "vows.mp4".into(),
            file_size: total_chunks as u64 * chunk_size,
            content_type: "video/mp4".into(),
            kind: MediaKind::Video,
            category: "ceremony".into(),
            mode: RequestedMode::Server,
            enable_chunking: Some(true),
            expires_secs: None,
        };
        let mut session = UploadSession::new(
            &request,
            UploadMode::Server,
            "videos/ceremony/user-1/vows.mp4".into(),
            time::Duration::seconds(600),
        );
        session.chunk_info = Some(ChunkInfo::new(total_chunks, chunk_size));
        session.staging_path = Some(ChunkAssembler::staging_path(
            staging_dir,
            session.id,
            &session.file_name,
        ));
        session
    }

    #[test]
    fn test_chunk_path_layout() {
        let staging = Path::new("/tmp/stage/abc_vows.mp4");
        let path = ChunkAssembler::chunk_path(staging, 7);
        assert_eq!(path, Path::new("/tmp/stage/abc_vows.mp4.chunk.7"));
    }

    #[test]
    fn test_staging_path_sanitizes_name() {
        let id = SessionId::new();
        let path = ChunkAssembler::staging_path(Path::new("/tmp/stage"), id, "our wedding (1).mp4");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("{id}_our_wedding__1_.mp4"));
    }

    #[tokio::test]
    async fn test_write_chunk_rejects_out_of_range_index() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let assembler = assembler(&store_dir).await;
        let session = chunked_session(staging_dir.path(), 3, 1024);

        let err = assembler
            .write_chunk(&session, 3, &Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_write_chunk_requires_chunked_session() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let assembler = assembler(&store_dir).await;
        let mut session = chunked_session(staging_dir.path(), 3, 1024);
        session.chunk_info = None;

        let err = assembler
            .write_chunk(&session, 0, &Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_rescan_reflects_disk_state() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let assembler = assembler(&store_dir).await;
        let mut session = chunked_session(staging_dir.path(), 3, 1024);

        // Recorded: 0 and 1. On disk: 0 and (unrecorded) 2.
        assembler
            .write_chunk(&session, 0, &Bytes::from_static(b"aa"))
            .await
            .unwrap();
        assembler
            .write_chunk(&session, 2, &Bytes::from_static(b"cc"))
            .await
            .unwrap();
        if let Some(info) = session.chunk_info.as_mut() {
            info.record_uploaded(0);
            info.record_uploaded(1);
        }

        assert!(assembler.rescan(&mut session).await.unwrap());
        let info = session.chunk_info.as_ref().unwrap();
        assert_eq!(
            info.uploaded_chunks.iter().copied().collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(info.failed_chunks.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(session.progress, 67);
    }

    #[tokio::test]
    async fn test_rescan_skips_unchunked_sessions() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let assembler = assembler(&store_dir).await;
        let mut session = chunked_session(staging_dir.path(), 3, 1024);
        session.chunk_info = None;

        assert!(!assembler.rescan(&mut session).await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_orders_chunks_and_discards_artifacts() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let assembler = assembler(&store_dir).await;
        let session = chunked_session(staging_dir.path(), 3, 2);

        // Written out of order; merge must still assemble by index.
        assembler
            .write_chunk(&session, 2, &Bytes::from_static(b"cc"))
            .await
            .unwrap();
        assembler
            .write_chunk(&session, 0, &Bytes::from_static(b"aa"))
            .await
            .unwrap();
        assembler
            .write_chunk(&session, 1, &Bytes::from_static(b"bb"))
            .await
            .unwrap();

        let size = assembler
            .merge_and_store(&session, &upload_policy())
            .await
            .unwrap();
        assert_eq!(size, 6);

        let stored = std::fs::read(store_dir.path().join(&session.object_key)).unwrap();
        assert_eq!(stored, b"aabbcc");

        let staging = session.staging_path.as_ref().unwrap();
        for index in 0..3 {
            assert!(!ChunkAssembler::chunk_path(staging, index).exists());
        }
    }

    #[tokio::test]
    async fn test_merge_fails_when_artifact_missing_and_keeps_the_rest() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let assembler = assembler(&store_dir).await;
        let session = chunked_session(staging_dir.path(), 2, 2);

        assembler
            .write_chunk(&session, 0, &Bytes::from_static(b"aa"))
            .await
            .unwrap();

        let err = assembler
            .merge_and_store(&session, &upload_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        // The surviving artifact is untouched so a resume can recover.
        let staging = session.staging_path.as_ref().unwrap();
        assert!(ChunkAssembler::chunk_path(staging, 0).exists());
        assert!(!store_dir.path().join(&session.object_key).exists());
    }

    #[tokio::test]
    async fn test_discard_artifacts_is_quiet_about_missing_files() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let assembler = assembler(&store_dir).await;
        let session = chunked_session(staging_dir.path(), 3, 1024);

        assembler
            .write_chunk(&session, 1, &Bytes::from_static(b"bb"))
            .await
            .unwrap();
        assembler.discard_artifacts(&session).await;

        let staging = session.staging_path.as_ref().unwrap();
        assert!(!ChunkAssembler::chunk_path(staging, 1).exists());
        // A second pass over now-missing files is a no-op.
        assembler.discard_artifacts(&session).await;
    }
}
