//! Object key generation.
//!
//! Keys follow `{kind}s/{category}/{user}/{timestamp}_{rand}_{name}` so
//! objects group by media kind and category, sort roughly by upload time,
//! and never collide even for identical file names.

use crate::session::MediaKind;
use time::OffsetDateTime;
use uuid::Uuid;

/// Replace anything outside `[A-Za-z0-9._-]` with underscores.
///
/// Keeps keys safe for object stores and local staging paths alike.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Build the object store key for a new upload.
pub fn object_key(kind: MediaKind, category: &str, user_id: &str, file_name: &str) -> String {
    let timestamp_ms =
        OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{}s/{}/{}/{}_{}_{}",
        kind,
        sanitize_file_name(category),
        sanitize_file_name(user_id),
        timestamp_ms,
        &nonce[..8],
        sanitize_file_name(file_name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_passes_safe_chars() {
        assert_eq!(sanitize_file_name("first-dance_01.mp4"), "first-dance_01.mp4");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_file_name("our wedding (1).jpg"), "our_wedding__1_.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("día-boda.png"), "d_a-boda.png");
    }

    #[test]
    fn test_key_shape() {
        let key = object_key(MediaKind::Video, "ceremony", "user-42", "vows final.mp4");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "videos");
        assert_eq!(parts[1], "ceremony");
        assert_eq!(parts[2], "user-42");
        assert!(parts[3].ends_with("_vows_final.mp4"));

        // timestamp_nonce prefix: millis, 8 hex chars, then the name.
        let mut segments = parts[3].splitn(3, '_');
        let ts = segments.next().unwrap();
        let nonce = segments.next().unwrap();
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(nonce.len(), 8);
    }

    #[test]
    fn test_keys_are_unique_for_same_name() {
        let a = object_key(MediaKind::Image, "other", "u", "a.jpg");
        let b = object_key(MediaKind::Image, "other", "u", "a.jpg");
        assert_ne!(a, b);
    }
}
