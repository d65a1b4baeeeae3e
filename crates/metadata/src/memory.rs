//! In-memory provider for tests and single-process deployments.

use crate::error::{MetadataError, MetadataResult};
use crate::registry::FileRegistry;
use crate::store::SessionStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hoist_core::record::{FileRecord, NewFileRecord};
use hoist_core::session::{SessionId, UploadSession};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone)]
struct StoredSession {
    session: UploadSession,
    ttl: Duration,
    deadline: OffsetDateTime,
}

/// Session store and file registry backed by process memory.
///
/// Nothing survives a restart. The sharded maps give the same per-session
/// write isolation the SQLite provider gets from its single connection.
#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<SessionId, StoredSession>,
    records: DashMap<Uuid, FileRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, including ones past their deadline.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: &UploadSession, ttl: Duration) -> MetadataResult<()> {
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(MetadataError::AlreadyExists(format!(
                "session {}",
                session.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(StoredSession {
                    session: session.clone(),
                    ttl,
                    deadline: OffsetDateTime::now_utc() + ttl,
                });
                Ok(())
            }
        }
    }

    async fn get(&self, id: SessionId) -> MetadataResult<Option<UploadSession>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .sessions
            .get(&id)
            .filter(|stored| stored.deadline > now)
            .map(|stored| stored.session.clone()))
    }

    async fn put(&self, session: &mut UploadSession) -> MetadataResult<()> {
        let mut stored = self
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| MetadataError::NotFound(format!("session {}", session.id)))?;
        if stored.session.version != session.version {
            return Err(MetadataError::VersionConflict {
                id: session.id.to_string(),
                expected: session.version,
            });
        }
        session.version += 1;
        stored.session = session.clone();
        stored.deadline = OffsetDateTime::now_utc() + stored.ttl;
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> MetadataResult<()> {
        self.sessions.remove(&id);
        Ok(())
    }

    async fn list_expired(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadSession>> {
        let mut expired = Vec::new();
        for entry in self.sessions.iter() {
            if expired.len() >= limit as usize {
                break;
            }
            let stored = entry.value();
            if stored.session.expires_at <= now || stored.deadline <= now {
                expired.push(stored.session.clone());
            }
        }
        Ok(expired)
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}

#[async_trait]
impl FileRegistry for MemoryStore {
    async fn create_file_record(&self, new: NewFileRecord) -> MetadataResult<FileRecord> {
        let record = FileRecord::from_new(new);
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_file_record(&self, id: Uuid) -> MetadataResult<Option<FileRecord>> {
        Ok(self.records.get(&id).map(|record| record.clone()))
    }
}
