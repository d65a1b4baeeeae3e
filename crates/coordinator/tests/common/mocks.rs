use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use hoist_storage::{ObjectInfo, ObjectStore, StorageError, StorageResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

/// In-memory object store with one-shot failure injection.
///
/// `fail_next_*` arms a counter; that many subsequent calls of the matching
/// operation return `StorageError::Unavailable` before touching any state.
/// Presigned URLs carry a per-call sequence number so tests can tell a
/// fresh URL from a reused one.
#[derive(Default)]
pub struct MockObjectStore {
    objects: DashMap<String, Bytes>,
    put_calls: AtomicU32,
    presign_calls: AtomicU32,
    exists_calls: AtomicU32,
    fail_puts: AtomicU32,
    fail_presigns: AtomicU32,
    fail_exists: AtomicU32,
}

// Each integration test binary compiles common/ on its own; helpers one
// binary does not use would otherwise trip dead_code.
#[allow(dead_code)]
impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|entry| entry.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn presign_calls(&self) -> u32 {
        self.presign_calls.load(Ordering::SeqCst)
    }

    pub fn exists_calls(&self) -> u32 {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_puts(&self, count: u32) {
        self.fail_puts.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_presigns(&self, count: u32) {
        self.fail_presigns.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_exists(&self, count: u32) {
        self.fail_exists.store(count, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn presign_upload(
        &self,
        key: &str,
        expires_in: Duration,
        _content_type: &str,
    ) -> StorageResult<String> {
        let seq = self.presign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Self::take_failure(&self.fail_presigns) {
            return Err(StorageError::Unavailable(
                "injected presign failure".to_string(),
            ));
        }
        Ok(format!(
            "https://uploads.test/{key}?sig={seq}&expires={}",
            expires_in.as_secs()
        ))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_puts) {
            return Err(StorageError::Unavailable(
                "injected put failure".to_string(),
            ));
        }
        self.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_exists) {
            return Err(StorageError::Unavailable(
                "injected exists failure".to_string(),
            ));
        }
        Ok(self.objects.contains_key(key))
    }

    async fn info(&self, key: &str) -> StorageResult<ObjectInfo> {
        let data = self
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectInfo {
            key: key.to_string(),
            size: data.len() as u64,
            url: format!("https://media.test/{key}"),
            last_modified: Some(OffsetDateTime::now_utc()),
            content_type: None,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
