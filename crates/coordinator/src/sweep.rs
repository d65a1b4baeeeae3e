//! Background reclamation of expired upload sessions.

use crate::coordinator::UploadCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Spawn a background task that periodically removes expired sessions and
/// their staging artifacts.
///
/// The task runs until the handle is aborted or the runtime shuts down.
/// Sweep failures are logged and the next tick tries again.
pub fn spawn_cleanup_task(
    coordinator: Arc<UploadCoordinator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = coordinator.cleanup_expired_sessions().await {
                warn!(error = %err, "expired session sweep failed");
            }
        }
    })
}
