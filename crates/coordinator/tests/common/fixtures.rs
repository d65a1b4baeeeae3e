//! Shared builders for coordinator integration tests.

use super::mocks::MockObjectStore;
use bytes::Bytes;
use hoist_coordinator::{OperationPolicies, UploadCoordinator};
use hoist_core::retry::{Backoff, RetryPolicy};
use hoist_core::session::{MediaKind, SessionId, UploadRequest, UploadSession};
use hoist_core::{RequestedMode, UploadConfig};
use hoist_metadata::{MemoryStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use time::OffsetDateTime;

/// Install a log subscriber that honors `RUST_LOG`, quiet by default.
///
/// Only the first call in the process installs one; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A coordinator wired to in-memory stores and a fresh staging directory.
///
/// The temp dir handle must stay alive for the duration of the test; the
/// staging directory is deleted when it drops.
pub struct TestCoordinator {
    pub coordinator: Arc<UploadCoordinator>,
    pub store: Arc<MockObjectStore>,
    pub sessions: Arc<MemoryStore>,
    pub temp_dir: TempDir,
}

/// Retry policy tuned for tests: three tries, millisecond backoff, no
/// breaker, no per-attempt timeout.
pub fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        base_delay: Duration::from_millis(1),
        backoff: Backoff::Fixed,
        max_delay: Duration::from_millis(5),
        timeout: None,
        jitter: None,
        breaker: None,
        retry_on: None,
    }
}

// Each integration test binary compiles common/ on its own; helpers one
// binary does not use would otherwise trip dead_code.
#[allow(dead_code)]
pub fn quick_policies() -> OperationPolicies {
    OperationPolicies {
        presign: quick_policy(),
        upload: quick_policy(),
        verify: quick_policy(),
        record: quick_policy(),
    }
}

/// Build a coordinator from the testing config profile, with tweaks applied
/// before construction.
pub fn build_coordinator(
    configure: impl FnOnce(&mut UploadConfig),
    policies: OperationPolicies,
) -> TestCoordinator {
    init_tracing();

    let temp_dir = TempDir::new().expect("create staging dir");
    let mut config = UploadConfig::for_testing();
    config.staging.temp_dir = temp_dir.path().to_path_buf();
    configure(&mut config);

    let store = Arc::new(MockObjectStore::new());
    let sessions = Arc::new(MemoryStore::new());
    let coordinator = UploadCoordinator::with_policies(
        config,
        store.clone(),
        sessions.clone(),
        sessions.clone(),
        policies,
    )
    .expect("test config must validate");

    TestCoordinator {
        coordinator: Arc::new(coordinator),
        store,
        sessions,
        temp_dir,
    }
}

#[allow(dead_code)]
pub fn test_coordinator() -> TestCoordinator {
    build_coordinator(|_| {}, quick_policies())
}

/// An image upload request of the given size.
#[allow(dead_code)]
pub fn image_request(user_id: &str, size: u64) -> UploadRequest {
    UploadRequest {
        user_id: user_id.into(),
        file_name: "first-dance.jpg".into(),
        file_size: size,
        content_type: "image/jpeg".into(),
        kind: MediaKind::Image,
        category: "reception".into(),
        mode: RequestedMode::Auto,
        enable_chunking: None,
        expires_secs: None,
    }
}

/// A video upload request of the given size.
#[allow(dead_code)]
pub fn video_request(user_id: &str, size: u64) -> UploadRequest {
    UploadRequest {
        user_id: user_id.into(),
        file_name: "vows.mp4".into(),
        file_size: size,
        content_type: "video/mp4".into(),
        kind: MediaKind::Video,
        category: "ceremony".into(),
        mode: RequestedMode::Auto,
        enable_chunking: None,
        expires_secs: None,
    }
}

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Split data into chunks of the given size; the last chunk may be short.
#[allow(dead_code)]
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    data.chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Fetch a session straight from the store, bypassing the coordinator.
#[allow(dead_code)]
pub async fn stored_session(sessions: &MemoryStore, id: SessionId) -> UploadSession {
    sessions
        .get(id)
        .await
        .expect("session store failed")
        .expect("session missing from store")
}

/// Push a stored session's upload window into the past.
#[allow(dead_code)]
pub async fn force_expire(sessions: &MemoryStore, id: SessionId) {
    let mut session = stored_session(sessions, id).await;
    session.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(5);
    sessions.put(&mut session).await.expect("expire write failed");
}

/// Number of files currently in the staging directory.
#[allow(dead_code)]
pub fn staging_file_count(temp_dir: &TempDir) -> usize {
    std::fs::read_dir(temp_dir.path())
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let a = seeded_bytes(42, 100);
        let b = seeded_bytes(42, 100);
        assert_eq!(a, b);

        let c = seeded_bytes(43, 100);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_into_chunks_covers_tail() {
        let data = seeded_bytes(1, 100);
        let chunks = split_into_chunks(&data, 30);
        assert_eq!(chunks.len(), 4);

        let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(reassembled, data.as_ref());
    }
}
