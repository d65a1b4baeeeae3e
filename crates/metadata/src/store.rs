//! Session store contract.

use crate::error::MetadataResult;
use async_trait::async_trait;
use hoist_core::session::{SessionId, UploadSession};
use std::time::Duration;
use time::OffsetDateTime;

/// Durable, TTL-bounded record of in-flight upload sessions.
///
/// The store is the single source of truth for session state across process
/// restarts. All writes after creation go through [`SessionStore::put`],
/// which compare-and-swaps on the session's `version` field so concurrent
/// mutators cannot silently overwrite each other.
///
/// A session carries two clocks: its own `expires_at` (the upload window the
/// client was promised) and the store's retention deadline (`ttl` past the
/// last write). Reads hide sessions past the retention deadline; sessions
/// past either clock show up in [`SessionStore::list_expired`] so the
/// sweeper can reclaim their staging artifacts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session with the given retention TTL.
    ///
    /// Fails with `AlreadyExists` if a session with the same ID is stored.
    async fn create(&self, session: &UploadSession, ttl: Duration) -> MetadataResult<()>;

    /// Fetch a session by ID.
    ///
    /// Returns `Ok(None)` for unknown IDs and for sessions past their
    /// retention deadline; an absent session is indistinguishable from a
    /// reclaimed one.
    async fn get(&self, id: SessionId) -> MetadataResult<Option<UploadSession>>;

    /// Write a session back, bumping its version.
    ///
    /// Succeeds only if the stored version still equals `session.version`;
    /// on success the version is bumped in place and the retention deadline
    /// is refreshed. A mismatch fails with `VersionConflict` and leaves both
    /// the stored session and the caller's copy untouched.
    async fn put(&self, session: &mut UploadSession) -> MetadataResult<()>;

    /// Remove a session. Removing an unknown ID is a no-op.
    async fn delete(&self, id: SessionId) -> MetadataResult<()>;

    /// List up to `limit` sessions whose upload window or retention deadline
    /// has passed as of `now`.
    async fn list_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadSession>>;

    /// Check store connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}
