//! The upload coordinator: session lifecycle and byte movement.
//!
//! Every mutation of a stored session goes through a compare-and-swap write;
//! on a version conflict the session is reloaded and the mutation reapplied,
//! so concurrent chunk uploads never lose each other's bookkeeping. The one
//! place that needs more than that is the merge trigger: completing the last
//! chunk claims the session (`uploading` to `processing`) through the same
//! CAS, and a caller who loses the claim reports current state instead of
//! merging twice.

use crate::assembler::ChunkAssembler;
use crate::classify;
use crate::executor::RetryExecutor;
use bytes::Bytes;
use hoist_core::chunk::ChunkInfo;
use hoist_core::config::TimeoutConfig;
use hoist_core::progress::{
    ResumeOutcome, RetryOutcome, ServerUploadOutcome, UploadProgress, UploadProgressDetail,
};
use hoist_core::record::{FileRecord, NewFileRecord};
use hoist_core::retry::RetryPolicy;
use hoist_core::session::{
    InitializedUpload, SessionId, SessionStatus, UploadRequest, UploadSession,
};
use hoist_core::{
    Error, MAX_FILE_NAME_LEN, Result, UploadConfig, UploadMode, object_key, select_mode,
};
use hoist_metadata::{FileRegistry, MetadataError, SessionStore};
use hoist_storage::{ObjectStore, StorageError};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

/// Confirm tolerates this much drift between the size the client declared
/// and the size the store reports before logging a warning.
const SIZE_MISMATCH_TOLERANCE: u64 = 1024;

/// Bound on compare-and-swap write retries, so two writers in pathological
/// lockstep cannot spin forever.
const MAX_SAVE_ATTEMPTS: u32 = 16;

/// Expired sessions reclaimed per cleanup pass.
const CLEANUP_BATCH: u32 = 100;

/// Retry policies for each class of remote operation the coordinator runs.
#[derive(Clone, Copy, Debug)]
pub struct OperationPolicies {
    /// Presigned URL generation.
    pub presign: RetryPolicy,
    /// Object uploads, whole files and merged chunks alike.
    pub upload: RetryPolicy,
    /// Existence checks and object metadata lookups.
    pub verify: RetryPolicy,
    /// File record creation in the registry.
    pub record: RetryPolicy,
}

impl OperationPolicies {
    /// Build the default policy set, with per-attempt timeouts taken from
    /// configuration.
    pub fn from_config(timeouts: &TimeoutConfig) -> Self {
        Self {
            presign: RetryPolicy::network().with_timeout(timeouts.presign()),
            upload: RetryPolicy::upload().with_timeout(timeouts.upload()),
            verify: RetryPolicy::fast().with_timeout(timeouts.verify()),
            record: RetryPolicy::standard(),
        }
    }
}

/// Coordinates resumable media uploads across the object store, the session
/// store, and the file registry.
///
/// The coordinator owns no background work; pair it with
/// [`crate::sweep::spawn_cleanup_task`] to reclaim expired sessions.
pub struct UploadCoordinator {
    config: UploadConfig,
    store: Arc<dyn ObjectStore>,
    sessions: Arc<dyn SessionStore>,
    registry: Arc<dyn FileRegistry>,
    executor: Arc<RetryExecutor>,
    assembler: ChunkAssembler,
    policies: OperationPolicies,
}

impl UploadCoordinator {
    /// Create a coordinator with policies derived from the configuration.
    pub fn new(
        config: UploadConfig,
        store: Arc<dyn ObjectStore>,
        sessions: Arc<dyn SessionStore>,
        registry: Arc<dyn FileRegistry>,
    ) -> Result<Self> {
        let policies = OperationPolicies::from_config(&config.timeouts);
        Self::with_policies(config, store, sessions, registry, policies)
    }

    /// Create a coordinator with explicit retry policies.
    pub fn with_policies(
        config: UploadConfig,
        store: Arc<dyn ObjectStore>,
        sessions: Arc<dyn SessionStore>,
        registry: Arc<dyn FileRegistry>,
        policies: OperationPolicies,
    ) -> Result<Self> {
        config.validate().map_err(Error::Validation)?;
        let executor = Arc::new(RetryExecutor::new());
        let assembler = ChunkAssembler::new(store.clone(), executor.clone());
        Ok(Self {
            config,
            store,
            sessions,
            registry,
            executor,
            assembler,
            policies,
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// The retry executor, exposing circuit breaker state.
    pub fn executor(&self) -> &Arc<RetryExecutor> {
        &self.executor
    }

    /// Validate a request, pick the upload mode, and create a session.
    ///
    /// Direct mode comes back with a presigned URL; server mode decides here
    /// whether the file will be chunked. Nothing is persisted until every
    /// preparatory step has succeeded, so a failed presign leaves no session
    /// behind.
    #[instrument(
        skip_all,
        fields(user_id = %request.user_id, file = %request.file_name, size = request.file_size)
    )]
    pub async fn initialize_upload(&self, request: UploadRequest) -> Result<InitializedUpload> {
        self.validate_request(&request)?;
        let mode = select_mode(request.mode, request.file_size, &self.config.mode)?;
        let key = object_key(
            request.kind,
            &request.category,
            &request.user_id,
            &request.file_name,
        );
        let expires_in = self.config.session.expires_in(request.expires_secs);
        let mut session = UploadSession::new(&request, mode, key, expires_in);

        match mode {
            UploadMode::Direct => {
                let secs = u64::try_from(expires_in.whole_seconds()).unwrap_or(0);
                let url = self
                    .presign_with(
                        &session.object_key,
                        &session.content_type,
                        StdDuration::from_secs(secs),
                        "generate-presigned-url",
                    )
                    .await?;
                session.presigned_url = Some(url);
            }
            UploadMode::Server => {
                session.staging_path = Some(ChunkAssembler::staging_path(
                    &self.config.staging.temp_dir,
                    session.id,
                    &session.file_name,
                ));
                let chunking = request
                    .enable_chunking
                    .unwrap_or(self.config.mode.enable_chunking);
                if chunking && request.file_size > self.config.mode.chunk_size {
                    session.chunk_info = Some(ChunkInfo::for_file(
                        request.file_size,
                        self.config.mode.chunk_size,
                    ));
                }
            }
        }

        self.sessions
            .create(&session, self.config.session.ttl())
            .await
            .map_err(classify::metadata_error)?;

        info!(
            session_id = %session.id,
            mode = %mode,
            chunked = session.chunk_info.is_some(),
            "upload session initialized"
        );
        Ok(InitializedUpload {
            session_id: session.id,
            mode,
            presigned_url: session.presigned_url.clone(),
            chunk_info: session.chunk_info.clone(),
            expires_at: session.expires_at,
            max_concurrent_chunks: self.config.mode.max_concurrent_chunks,
        })
    }

    /// Accept bytes for a server-mode session: one chunk when `chunk_index`
    /// is given, the whole file otherwise.
    ///
    /// Completing the final chunk triggers the merge inline. A failure on
    /// the routed path marks the session failed (recording the chunk index
    /// when one was involved) and propagates the error; the client can
    /// resume later.
    #[instrument(
        skip_all,
        fields(
            session_id = %session_id,
            user_id = %user_id,
            chunk = ?chunk_index,
            size = data.len()
        )
    )]
    pub async fn upload_to_server(
        &self,
        session_id: SessionId,
        user_id: &str,
        data: Bytes,
        chunk_index: Option<u32>,
        total_chunks: Option<u32>,
    ) -> Result<ServerUploadOutcome> {
        let mut session = self.load_owned(session_id, user_id).await?;

        if session.mode != UploadMode::Server {
            return Err(Error::Validation(
                "session uses direct upload; send bytes to the presigned URL".into(),
            ));
        }
        if !session.status.accepts_bytes() {
            // A duplicate chunk arriving after the merge was claimed (or
            // finished) reports current state instead of failing the sender.
            if chunk_index.is_some()
                && session.chunk_info.is_some()
                && matches!(
                    session.status,
                    SessionStatus::Processing | SessionStatus::Completed
                )
            {
                return Ok(ServerUploadOutcome::snapshot(&session, chunk_index));
            }
            return Err(Error::Validation(format!(
                "session in state '{}' does not accept bytes",
                session.status
            )));
        }
        if data.is_empty() {
            return Err(Error::Validation("upload payload is empty".into()));
        }

        self.save_session(&mut session, |s| {
            if s.status == SessionStatus::Pending {
                s.status = SessionStatus::Uploading;
            }
        })
        .await?;

        let routed = match (session.chunk_info.is_some(), chunk_index) {
            (true, Some(index)) => {
                self.accept_chunk(&mut session, index, total_chunks, data)
                    .await
            }
            (true, None) => Err(Error::Validation(
                "chunked session requires a chunk index".into(),
            )),
            (false, Some(_)) => Err(Error::Validation(
                "session was not initialized for chunked upload".into(),
            )),
            (false, None) => self.store_whole_file(&mut session, data).await,
        };

        match routed {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.fail_session(&mut session, &err, chunk_index).await;
                Err(err)
            }
        }
    }

    /// Verify the uploaded object, write its file record, and complete the
    /// session.
    ///
    /// This is the required closer for direct mode, where the coordinator
    /// never saw the bytes. Confirming an already-confirmed session returns
    /// the existing record. On failure the session stays in `processing`
    /// with the cause recorded, so the client can confirm again once the
    /// object lands.
    #[instrument(skip_all, fields(session_id = %session_id, user_id = %user_id))]
    pub async fn confirm_upload(
        &self,
        session_id: SessionId,
        user_id: &str,
        actual_size: Option<u64>,
    ) -> Result<FileRecord> {
        let mut session = self.load_owned(session_id, user_id).await?;

        if session.status == SessionStatus::Completed {
            if let Some(record) = session.file_record.clone() {
                return Ok(record);
            }
            // Completed by a server upload but never confirmed: fall through
            // and build the record now.
        } else if !session.status.can_confirm() {
            return Err(Error::Validation(format!(
                "session in state '{}' cannot be confirmed",
                session.status
            )));
        }

        self.save_session(&mut session, |s| {
            if s.status != SessionStatus::Completed {
                s.status = SessionStatus::Processing;
            }
        })
        .await?;

        match self.finalize_confirm(&mut session, actual_size).await {
            Ok(record) => Ok(record),
            Err(err) => {
                let message = err.to_string();
                let noted = self
                    .save_session(&mut session, |s| {
                        if !s.status.is_terminal() {
                            s.last_error = Some(message.clone());
                        }
                    })
                    .await;
                if let Err(save_err) = noted {
                    warn!(
                        session_id = %session.id,
                        error = %save_err,
                        "failed to record confirmation failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// Reset a session for a fresh attempt at the same object key.
    ///
    /// Bounded by the configured retry budget. Direct-mode sessions get a
    /// new presigned URL scoped to the session's remaining lifetime; a
    /// presign failure leaves the stored session untouched.
    #[instrument(skip_all, fields(session_id = %session_id, user_id = %user_id))]
    pub async fn retry_upload(&self, session_id: SessionId, user_id: &str) -> Result<RetryOutcome> {
        let mut session = self.load_owned(session_id, user_id).await?;

        if session.status.is_terminal() {
            return Err(Error::Validation(format!(
                "session in state '{}' cannot be retried",
                session.status
            )));
        }
        if session.retry_count >= self.config.retry.attempts {
            return Err(Error::Validation(format!(
                "retry limit of {} attempts reached",
                self.config.retry.attempts
            )));
        }

        let url = if session.mode == UploadMode::Direct {
            Some(
                self.presign_for_remaining_window(&session, "generate-presigned-url-retry")
                    .await?,
            )
        } else {
            None
        };

        self.save_session(&mut session, |s| {
            if s.status.is_terminal() {
                return;
            }
            s.status = SessionStatus::Pending;
            s.progress = 0;
            s.retry_count += 1;
            s.last_error = None;
            if let Some(url) = &url {
                s.presigned_url = Some(url.clone());
            }
        })
        .await?;

        info!(
            session_id = %session.id,
            retry_count = session.retry_count,
            "upload retry initiated"
        );
        Ok(RetryOutcome {
            session_id: session.id,
            mode: session.mode,
            presigned_url: session.presigned_url.clone(),
            chunk_info: session.chunk_info.clone(),
            retry_count: session.retry_count,
        })
    }

    /// Pick up an interrupted upload where it left off.
    ///
    /// Chunked sessions are rescanned against the staging directory first,
    /// so the reported chunk state reflects what actually survived; a chunk
    /// that was recorded but lost its artifact is flagged for re-upload.
    /// Direct-mode sessions get a fresh presigned URL for the remaining
    /// session lifetime.
    #[instrument(skip_all, fields(session_id = %session_id, user_id = %user_id))]
    pub async fn resume_upload(
        &self,
        session_id: SessionId,
        user_id: &str,
    ) -> Result<ResumeOutcome> {
        if !self.config.mode.enable_resume {
            return Err(Error::Validation("resumable uploads are disabled".into()));
        }
        let mut session = self.load_owned(session_id, user_id).await?;

        if !session.status.can_resume() {
            return Err(Error::Validation(format!(
                "session in state '{}' cannot be resumed",
                session.status
            )));
        }
        if session.is_expired() {
            return Err(Error::SessionNotFound(format!(
                "upload session {session_id} has expired"
            )));
        }

        let rescanned = self.assembler.rescan(&mut session).await?;
        let chunk_state = session.chunk_info.clone();
        let progress = session.progress;

        let url = if session.mode == UploadMode::Direct {
            Some(
                self.presign_for_remaining_window(&session, "generate-presigned-url-resume")
                    .await?,
            )
        } else {
            None
        };

        self.save_session(&mut session, |s| {
            if s.status.is_terminal() {
                return;
            }
            s.status = SessionStatus::Pending;
            s.last_error = None;
            if rescanned {
                s.chunk_info = chunk_state.clone();
                s.progress = progress;
            }
            if let Some(url) = &url {
                s.presigned_url = Some(url.clone());
            }
        })
        .await?;

        info!(
            session_id = %session.id,
            progress = session.progress,
            rescanned,
            "upload resumed"
        );
        Ok(ResumeOutcome {
            session_id: session.id,
            status: session.status,
            progress: session.progress,
            mode: session.mode,
            presigned_url: session.presigned_url.clone(),
            chunk_info: session.chunk_info.clone(),
        })
    }

    /// Cancel a non-terminal session, removing its staging artifacts and,
    /// when the object may already have been written, the object itself.
    #[instrument(skip_all, fields(session_id = %session_id, user_id = %user_id))]
    pub async fn cancel_upload(&self, session_id: SessionId, user_id: &str) -> Result<()> {
        let mut session = self.load_owned(session_id, user_id).await?;
        if session.status.is_terminal() {
            return Err(Error::Validation(format!(
                "session in state '{}' cannot be cancelled",
                session.status
            )));
        }

        self.assembler.discard_artifacts(&session).await;

        if session.status == SessionStatus::Processing {
            match self.store.delete(&session.object_key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(err) => warn!(
                    session_id = %session.id,
                    key = %session.object_key,
                    error = %err,
                    "failed to delete object while cancelling"
                ),
            }
        }

        self.save_session(&mut session, |s| {
            if !s.status.is_terminal() {
                s.status = SessionStatus::Cancelled;
            }
        })
        .await?;

        info!(session_id = %session.id, "upload cancelled");
        Ok(())
    }

    /// Basic progress for a session.
    pub async fn upload_progress(
        &self,
        session_id: SessionId,
        user_id: &str,
    ) -> Result<UploadProgress> {
        let session = self.load_owned(session_id, user_id).await?;
        Ok(UploadProgress::from_session(&session))
    }

    /// Detailed progress: chunk-level state, resumability, and a naive
    /// time-remaining estimate.
    pub async fn upload_progress_detail(
        &self,
        session_id: SessionId,
        user_id: &str,
    ) -> Result<UploadProgressDetail> {
        let session = self.load_owned(session_id, user_id).await?;
        Ok(UploadProgressDetail::from_session(
            &session,
            self.config.mode.enable_resume,
        ))
    }

    /// Reclaim sessions past their upload window or retention deadline,
    /// deleting their staging artifacts and store records. Returns how many
    /// sessions were removed.
    #[instrument(skip(self))]
    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        let now = OffsetDateTime::now_utc();
        let expired = self
            .sessions
            .list_expired(now, CLEANUP_BATCH)
            .await
            .map_err(classify::metadata_error)?;

        let mut removed = 0u64;
        for session in expired {
            self.assembler.discard_artifacts(&session).await;
            self.sessions
                .delete(session.id)
                .await
                .map_err(classify::metadata_error)?;
            debug!(
                session_id = %session.id,
                status = %session.status,
                "expired upload session reclaimed"
            );
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "cleaned up expired upload sessions");
        }
        Ok(removed)
    }

    fn validate_request(&self, request: &UploadRequest) -> Result<()> {
        if request.user_id.is_empty() {
            return Err(Error::Validation("user id cannot be empty".into()));
        }
        if request.file_name.is_empty() {
            return Err(Error::Validation("file name cannot be empty".into()));
        }
        if request.file_name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(Error::Validation(format!(
                "file name exceeds {MAX_FILE_NAME_LEN} characters"
            )));
        }
        if request.file_size == 0 {
            return Err(Error::Validation("file size must be positive".into()));
        }
        if request.expires_secs == Some(0) {
            return Err(Error::Validation("expires_secs must be positive".into()));
        }

        let max = self.config.limits.max_size(request.kind);
        if request.file_size > max {
            return Err(Error::Validation(format!(
                "{} of {} bytes exceeds the {} byte limit",
                request.kind, request.file_size, max
            )));
        }
        let allowed = self.config.limits.allowed_types(request.kind);
        if !allowed
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&request.content_type))
        {
            return Err(Error::Validation(format!(
                "content type '{}' is not allowed for {} uploads",
                request.content_type, request.kind
            )));
        }
        Ok(())
    }

    async fn accept_chunk(
        &self,
        session: &mut UploadSession,
        index: u32,
        total_chunks: Option<u32>,
        data: Bytes,
    ) -> Result<ServerUploadOutcome> {
        if let (Some(declared), Some(info)) = (total_chunks, &session.chunk_info) {
            if declared != info.total_chunks {
                return Err(Error::Validation(format!(
                    "request declares {declared} chunks but the session has {}",
                    info.total_chunks
                )));
            }
        }

        self.assembler.write_chunk(session, index, &data).await?;

        self.save_session(session, |s| {
            if let Some(info) = s.chunk_info.as_mut() {
                info.record_uploaded(index);
            }
            s.apply_chunk_progress();
        })
        .await?;

        let complete = session
            .chunk_info
            .as_ref()
            .is_some_and(|info| info.is_complete());
        if !complete {
            debug!(
                session_id = %session.id,
                chunk = index,
                progress = session.progress,
                "chunk accepted"
            );
            return Ok(ServerUploadOutcome::snapshot(session, Some(index)));
        }

        if let Some(outcome) = self.claim_merge(session, index).await? {
            return Ok(outcome);
        }
        let merged = self
            .assembler
            .merge_and_store(session, &self.policies.upload)
            .await?;
        info!(
            session_id = %session.id,
            key = %session.object_key,
            size = merged,
            "chunked upload merged and stored"
        );
        self.complete_session(session, Some(index)).await
    }

    async fn store_whole_file(
        &self,
        session: &mut UploadSession,
        data: Bytes,
    ) -> Result<ServerUploadOutcome> {
        let size = data.len();
        let store = self.store.clone();
        let key = session.object_key.clone();
        self.executor
            .execute("upload-complete-file", &self.policies.upload, move || {
                let store = store.clone();
                let key = key.clone();
                let data = data.clone();
                async move { store.put(&key, data).await.map_err(classify::storage_error) }
            })
            .await?;

        info!(
            session_id = %session.id,
            key = %session.object_key,
            size,
            "file stored via server upload"
        );
        self.complete_session(session, None).await
    }

    /// Claim the merge by moving the session to `processing`. Returns
    /// `Ok(Some(outcome))` when another caller already holds the session
    /// past the uploading phase, in which case the chunk call is a no-op.
    async fn claim_merge(
        &self,
        session: &mut UploadSession,
        chunk_index: u32,
    ) -> Result<Option<ServerUploadOutcome>> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            session.status = SessionStatus::Processing;
            session.touch();
            match self.sessions.put(session).await {
                Ok(()) => return Ok(None),
                Err(MetadataError::VersionConflict { .. }) => {
                    *session = self.load_session(session.id).await?;
                    if !session.status.accepts_bytes() {
                        return Ok(Some(ServerUploadOutcome::snapshot(
                            session,
                            Some(chunk_index),
                        )));
                    }
                }
                Err(err) => return Err(classify::metadata_error(err)),
            }
        }
        Err(Error::Transient(format!(
            "session {} is being modified concurrently",
            session.id
        )))
    }

    /// Mark the session completed, yielding to a concurrent terminal
    /// transition instead of overwriting it.
    async fn complete_session(
        &self,
        session: &mut UploadSession,
        chunk_index: Option<u32>,
    ) -> Result<ServerUploadOutcome> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            session.mark_completed();
            match self.sessions.put(session).await {
                Ok(()) => return Ok(ServerUploadOutcome::snapshot(session, chunk_index)),
                Err(MetadataError::VersionConflict { .. }) => {
                    *session = self.load_session(session.id).await?;
                    if session.status.is_terminal() {
                        warn!(
                            session_id = %session.id,
                            status = %session.status,
                            "session reached a terminal state while its upload was finishing"
                        );
                        return Ok(ServerUploadOutcome::snapshot(session, chunk_index));
                    }
                }
                Err(err) => return Err(classify::metadata_error(err)),
            }
        }
        Err(Error::Transient(format!(
            "session {} is being modified concurrently",
            session.id
        )))
    }

    async fn finalize_confirm(
        &self,
        session: &mut UploadSession,
        actual_size: Option<u64>,
    ) -> Result<FileRecord> {
        let key = session.object_key.clone();

        let store = self.store.clone();
        let check_key = key.clone();
        let exists = self
            .executor
            .execute("verify-file-exists", &self.policies.verify, move || {
                let store = store.clone();
                let key = check_key.clone();
                async move { store.exists(&key).await.map_err(classify::storage_error) }
            })
            .await?;
        if !exists {
            return Err(Error::Transient(format!(
                "uploaded object missing from storage under key '{key}'"
            )));
        }

        let store = self.store.clone();
        let info_key = key.clone();
        let object = self
            .executor
            .execute("get-file-info", &self.policies.verify, move || {
                let store = store.clone();
                let key = info_key.clone();
                async move { store.info(&key).await.map_err(classify::storage_error) }
            })
            .await?;

        if let Some(declared) = actual_size {
            if declared.abs_diff(object.size) > SIZE_MISMATCH_TOLERANCE {
                warn!(
                    session_id = %session.id,
                    declared,
                    stored = object.size,
                    "declared size differs from stored object size"
                );
            }
        }

        let stored_name = key
            .rsplit('/')
            .next()
            .unwrap_or(&session.file_name)
            .to_string();
        let new_record = NewFileRecord {
            user_id: session.user_id.clone(),
            filename: stored_name,
            original_name: session.file_name.clone(),
            file_size: actual_size.unwrap_or(object.size),
            file_type: session.kind,
            category: session.category.clone(),
            url: object.url.clone(),
            storage_key: key.clone(),
            mime_type: session.content_type.clone(),
        };

        let registry = self.registry.clone();
        let record = self
            .executor
            .execute("create-file-record", &self.policies.record, move || {
                let registry = registry.clone();
                let new = new_record.clone();
                async move {
                    registry
                        .create_file_record(new)
                        .await
                        .map_err(classify::metadata_error)
                }
            })
            .await?;

        self.save_session(session, |s| {
            if s.status != SessionStatus::Cancelled {
                s.file_record = Some(record.clone());
                s.mark_completed();
            }
        })
        .await?;
        self.assembler.discard_artifacts(session).await;

        info!(
            session_id = %session.id,
            record_id = %record.id,
            key = %session.object_key,
            "upload confirmed"
        );
        Ok(record)
    }

    async fn load_session(&self, id: SessionId) -> Result<UploadSession> {
        self.sessions
            .get(id)
            .await
            .map_err(classify::metadata_error)?
            .ok_or_else(|| Error::SessionNotFound(format!("upload session {id} not found")))
    }

    async fn load_owned(&self, id: SessionId, user_id: &str) -> Result<UploadSession> {
        let session = self.load_session(id).await?;
        if session.user_id != user_id {
            return Err(Error::Permission(format!(
                "user {user_id} does not own upload session {id}"
            )));
        }
        Ok(session)
    }

    /// Apply `mutate` to the session and write it back, reloading and
    /// reapplying on version conflicts. The mutation must be written against
    /// whatever state it is given; it runs once per load.
    async fn save_session<M>(&self, session: &mut UploadSession, mutate: M) -> Result<()>
    where
        M: Fn(&mut UploadSession),
    {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            mutate(session);
            session.touch();
            match self.sessions.put(session).await {
                Ok(()) => return Ok(()),
                Err(MetadataError::VersionConflict { .. }) => {
                    *session = self.load_session(session.id).await?;
                }
                Err(err) => return Err(classify::metadata_error(err)),
            }
        }
        Err(Error::Transient(format!(
            "session {} is being modified concurrently",
            session.id
        )))
    }

    /// Mark the session failed with the error's message, never pulling it
    /// out of a terminal state. Failures here are logged, not propagated;
    /// the caller is already returning the original error.
    async fn fail_session(
        &self,
        session: &mut UploadSession,
        err: &Error,
        failed_chunk: Option<u32>,
    ) {
        let message = err.to_string();
        let saved = self
            .save_session(session, |s| {
                if s.status.is_terminal() {
                    return;
                }
                if let (Some(index), Some(info)) = (failed_chunk, s.chunk_info.as_mut()) {
                    if info.contains_index(index) {
                        info.record_failed(index);
                    }
                }
                s.mark_failed(message.clone());
            })
            .await;
        if let Err(save_err) = saved {
            warn!(
                session_id = %session.id,
                error = %save_err,
                "failed to record upload failure on session"
            );
        }
    }

    async fn presign_for_remaining_window(
        &self,
        session: &UploadSession,
        operation: &'static str,
    ) -> Result<String> {
        let secs = session
            .remaining_ttl()
            .map(|d| d.whole_seconds())
            .unwrap_or(0);
        if secs <= 0 {
            return Err(Error::SessionNotFound(format!(
                "upload session {} has expired",
                session.id
            )));
        }
        self.presign_with(
            &session.object_key,
            &session.content_type,
            StdDuration::from_secs(secs as u64),
            operation,
        )
        .await
    }

    async fn presign_with(
        &self,
        key: &str,
        content_type: &str,
        expires_in: StdDuration,
        operation: &'static str,
    ) -> Result<String> {
        let store = self.store.clone();
        let key = key.to_string();
        let content_type = content_type.to_string();
        self.executor
            .execute(operation, &self.policies.presign, move || {
                let store = store.clone();
                let key = key.clone();
                let content_type = content_type.clone();
                async move {
                    store
                        .presign_upload(&key, expires_in, &content_type)
                        .await
                        .map_err(classify::storage_error)
                }
            })
            .await
    }
}
