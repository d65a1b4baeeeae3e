//! Upload pipeline configuration.

use crate::session::MediaKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-kind size limits and MIME allow-lists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum image size in bytes.
    #[serde(default = "default_max_image_size")]
    pub max_image_size: u64,
    /// Maximum video size in bytes.
    #[serde(default = "default_max_video_size")]
    pub max_video_size: u64,
    /// Maximum audio size in bytes.
    #[serde(default = "default_max_audio_size")]
    pub max_audio_size: u64,
    /// Accepted image MIME types.
    #[serde(default = "default_image_types")]
    pub allowed_image_types: Vec<String>,
    /// Accepted video MIME types.
    #[serde(default = "default_video_types")]
    pub allowed_video_types: Vec<String>,
    /// Accepted audio MIME types.
    #[serde(default = "default_audio_types")]
    pub allowed_audio_types: Vec<String>,
}

fn default_max_image_size() -> u64 {
    50 * 1024 * 1024
}

fn default_max_video_size() -> u64 {
    500 * 1024 * 1024
}

fn default_max_audio_size() -> u64 {
    100 * 1024 * 1024
}

fn default_image_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/gif", "image/webp"]
        .map(String::from)
        .to_vec()
}

fn default_video_types() -> Vec<String> {
    ["video/mp4", "video/avi", "video/mov", "video/wmv"]
        .map(String::from)
        .to_vec()
}

fn default_audio_types() -> Vec<String> {
    ["audio/mp3", "audio/wav", "audio/aac"]
        .map(String::from)
        .to_vec()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_size: default_max_image_size(),
            max_video_size: default_max_video_size(),
            max_audio_size: default_max_audio_size(),
            allowed_image_types: default_image_types(),
            allowed_video_types: default_video_types(),
            allowed_audio_types: default_audio_types(),
        }
    }
}

impl LimitsConfig {
    /// Size limit for a media kind.
    pub fn max_size(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Image => self.max_image_size,
            MediaKind::Video => self.max_video_size,
            MediaKind::Audio => self.max_audio_size,
        }
    }

    /// Accepted MIME types for a media kind.
    pub fn allowed_types(&self, kind: MediaKind) -> &[String] {
        match kind {
            MediaKind::Image => &self.allowed_image_types,
            MediaKind::Video => &self.allowed_video_types,
            MediaKind::Audio => &self.allowed_audio_types,
        }
    }
}

/// Per-attempt timeouts for remote calls, in seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for object uploads (whole files and merged chunks).
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_secs: u64,
    /// Timeout for presigned URL generation.
    #[serde(default = "default_presign_timeout_secs")]
    pub presign_secs: u64,
    /// Timeout for existence checks and metadata lookups.
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_secs: u64,
    /// Smallest timeout the config will accept.
    #[serde(default = "default_min_timeout_secs")]
    pub min_secs: u64,
    /// Largest timeout the config will accept.
    #[serde(default = "default_max_timeout_secs")]
    pub max_secs: u64,
}

fn default_upload_timeout_secs() -> u64 {
    300
}

fn default_presign_timeout_secs() -> u64 {
    30
}

fn default_verify_timeout_secs() -> u64 {
    10
}

fn default_min_timeout_secs() -> u64 {
    10
}

fn default_max_timeout_secs() -> u64 {
    1800
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upload_secs: default_upload_timeout_secs(),
            presign_secs: default_presign_timeout_secs(),
            verify_secs: default_verify_timeout_secs(),
            min_secs: default_min_timeout_secs(),
            max_secs: default_max_timeout_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn upload(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upload_secs)
    }

    pub fn presign(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.presign_secs)
    }

    pub fn verify(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.verify_secs)
    }

    fn check(&self, violations: &mut Vec<String>) {
        if self.min_secs >= self.max_secs {
            violations.push(format!(
                "timeouts.min_secs {} must be below timeouts.max_secs {}",
                self.min_secs, self.max_secs
            ));
        }
        for (name, value) in [
            ("upload_secs", self.upload_secs),
            ("presign_secs", self.presign_secs),
            ("verify_secs", self.verify_secs),
        ] {
            if value < self.min_secs || value > self.max_secs {
                violations.push(format!(
                    "timeouts.{name} {value} outside allowed range {}..={}",
                    self.min_secs, self.max_secs
                ));
            }
        }
    }
}

/// Session-level retry budget and delay bounds.
///
/// The executor's per-operation policies carry their own backoff tuning;
/// this governs how many times a client may restart a whole upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// How many times a session may be retried via `retry_upload`.
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    /// Hard ceiling on the retry budget.
    #[serde(default = "default_max_retry_attempts")]
    pub max_attempts: u32,
    /// Base delay clients are told to wait between retries, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Smallest acceptable base delay.
    #[serde(default = "default_retry_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Largest acceptable base delay.
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_max_retry_attempts() -> u32 {
    10
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_min_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            max_attempts: default_max_retry_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            min_delay_ms: default_retry_min_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    fn check(&self, violations: &mut Vec<String>) {
        if self.attempts > self.max_attempts {
            violations.push(format!(
                "retry.attempts {} exceeds retry.max_attempts {}",
                self.attempts, self.max_attempts
            ));
        }
        if self.base_delay_ms < self.min_delay_ms {
            violations.push(format!(
                "retry.base_delay_ms {} below retry.min_delay_ms {}",
                self.base_delay_ms, self.min_delay_ms
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            violations.push(format!(
                "retry.base_delay_ms {} above retry.max_delay_ms {}",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
    }
}

/// Upload mode selection and chunking knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Allow presigned direct-to-store uploads at all.
    #[serde(default = "default_true")]
    pub enable_direct_upload: bool,
    /// Route everything through the server regardless of request.
    #[serde(default)]
    pub force_server_upload: bool,
    /// Auto mode sends files larger than this through the server.
    #[serde(default = "default_auto_mode_threshold")]
    pub auto_mode_threshold: u64,
    /// Largest file allowed via direct upload.
    #[serde(default = "default_direct_upload_size_limit")]
    pub direct_upload_size_limit: u64,
    /// Largest file allowed via server upload.
    #[serde(default = "default_server_upload_size_limit")]
    pub server_upload_size_limit: u64,
    /// Split server uploads above `chunk_size` into chunks.
    #[serde(default = "default_true")]
    pub enable_chunking: bool,
    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Parallel chunk uploads advertised to clients.
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: u32,
    /// Allow interrupted uploads to be resumed.
    #[serde(default = "default_true")]
    pub enable_resume: bool,
}

fn default_true() -> bool {
    true
}

fn default_auto_mode_threshold() -> u64 {
    10 * 1024 * 1024
}

fn default_direct_upload_size_limit() -> u64 {
    100 * 1024 * 1024
}

fn default_server_upload_size_limit() -> u64 {
    1024 * 1024 * 1024
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_concurrent_chunks() -> u32 {
    3
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            enable_direct_upload: true,
            force_server_upload: false,
            auto_mode_threshold: default_auto_mode_threshold(),
            direct_upload_size_limit: default_direct_upload_size_limit(),
            server_upload_size_limit: default_server_upload_size_limit(),
            enable_chunking: true,
            chunk_size: default_chunk_size(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            enable_resume: true,
        }
    }
}

impl ModeConfig {
    fn check(&self, violations: &mut Vec<String>) {
        if self.chunk_size < crate::MIN_CHUNK_SIZE {
            violations.push(format!(
                "mode.chunk_size {} below minimum {}",
                self.chunk_size,
                crate::MIN_CHUNK_SIZE
            ));
        }
        if self.auto_mode_threshold > self.direct_upload_size_limit {
            violations.push(format!(
                "mode.auto_mode_threshold {} exceeds direct_upload_size_limit {}",
                self.auto_mode_threshold, self.direct_upload_size_limit
            ));
        }
        if self.direct_upload_size_limit > self.server_upload_size_limit {
            violations.push(format!(
                "mode.direct_upload_size_limit {} exceeds server_upload_size_limit {}",
                self.direct_upload_size_limit, self.server_upload_size_limit
            ));
        }
        if self.max_concurrent_chunks == 0 {
            violations.push("mode.max_concurrent_chunks cannot be 0".to_string());
        }
    }
}

/// Staging area for server-mode uploads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Directory for staging files and chunk artifacts.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Seconds between expired-session sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("uploads/temp")
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl StagingConfig {
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }

    fn check(&self, violations: &mut Vec<String>) {
        if self.temp_dir.as_os_str().is_empty() {
            violations.push("staging.temp_dir cannot be empty".to_string());
        }
        // A zero interval would panic when creating the sweep timer.
        if self.cleanup_interval_secs == 0 {
            violations.push("staging.cleanup_interval_secs cannot be 0".to_string());
        }
    }
}

/// Session store lifetimes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long the store keeps a session record after its last write.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    /// Default session/presign lifetime when the request does not say.
    #[serde(default = "default_expires_secs")]
    pub default_expires_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    7200
}

fn default_expires_secs() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            default_expires_secs: default_expires_secs(),
        }
    }
}

impl SessionConfig {
    /// Store record TTL.
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_secs)
    }

    /// Session expiry window, honoring a per-request override.
    pub fn expires_in(&self, requested_secs: Option<u64>) -> time::Duration {
        let secs = requested_secs.unwrap_or(self.default_expires_secs);
        time::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }

    fn check(&self, violations: &mut Vec<String>) {
        if self.ttl_secs == 0 {
            violations.push("session.ttl_secs cannot be 0".to_string());
        }
        if self.default_expires_secs == 0 {
            violations.push("session.default_expires_secs cannot be 0".to_string());
        }
    }
}

/// Complete upload pipeline configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub mode: ModeConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl UploadConfig {
    /// Validate the whole configuration, collecting every violation so a
    /// bad deployment surfaces all its problems in one pass.
    pub fn validate(&self) -> Result<(), String> {
        let mut violations = Vec::new();
        for (kind, max) in [
            (MediaKind::Image, self.limits.max_image_size),
            (MediaKind::Video, self.limits.max_video_size),
            (MediaKind::Audio, self.limits.max_audio_size),
        ] {
            if max == 0 {
                violations.push(format!("limits.max_{kind}_size cannot be 0"));
            }
            if self.limits.allowed_types(kind).is_empty() {
                violations.push(format!("limits.allowed_{kind}_types cannot be empty"));
            }
        }
        self.timeouts.check(&mut violations);
        self.retry.check(&mut violations);
        self.mode.check(&mut violations);
        self.staging.check(&mut violations);
        self.session.check(&mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations.join("; "))
        }
    }

    /// Create a configuration with small limits suitable for tests.
    ///
    /// **For testing only.** Chunk size drops to the minimum so chunked
    /// paths are exercised without large fixtures. `staging.temp_dir`
    /// should be pointed at a per-test temporary directory.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.mode.chunk_size = crate::MIN_CHUNK_SIZE;
        config.mode.auto_mode_threshold = 2 * 1024 * 1024;
        config.mode.direct_upload_size_limit = 8 * 1024 * 1024;
        config.mode.server_upload_size_limit = 64 * 1024 * 1024;
        config.session.ttl_secs = 600;
        config.session.default_expires_secs = 600;
        config.staging.temp_dir = PathBuf::from("./data/test-staging");
        config
    }
}
