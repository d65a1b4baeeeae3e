//! Upload mode selection.

use crate::config::ModeConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the bytes travel: straight to the object store, or through us.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Client uploads directly to the object store via a presigned URL.
    Direct,
    /// Client sends bytes to the server, which stages and forwards them.
    Server,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Mode as requested by the client. `Auto` defers to the size threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedMode {
    Direct,
    Server,
    #[default]
    Auto,
}

/// Resolve the effective upload mode for a file.
///
/// Deployment policy wins first: when direct upload is disabled or server
/// upload is forced, everything goes through the server. An explicit direct
/// request for a file above the direct size limit is silently downgraded to
/// server mode rather than rejected. Files too large even for server mode
/// are rejected outright.
pub fn select_mode(
    requested: RequestedMode,
    file_size: u64,
    config: &ModeConfig,
) -> Result<UploadMode> {
    let resolved = if config.force_server_upload || !config.enable_direct_upload {
        UploadMode::Server
    } else {
        match requested {
            RequestedMode::Direct if file_size > config.direct_upload_size_limit => {
                UploadMode::Server
            }
            RequestedMode::Direct => UploadMode::Direct,
            RequestedMode::Server => UploadMode::Server,
            RequestedMode::Auto => {
                if file_size > config.auto_mode_threshold {
                    UploadMode::Server
                } else {
                    UploadMode::Direct
                }
            }
        }
    };

    if resolved == UploadMode::Server && file_size > config.server_upload_size_limit {
        return Err(Error::Validation(format!(
            "file size {} exceeds the server upload limit of {} bytes",
            file_size, config.server_upload_size_limit
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn config() -> ModeConfig {
        ModeConfig::default()
    }

    #[test]
    fn test_auto_uses_size_threshold() {
        // Defaults: auto threshold 10 MiB.
        assert_eq!(
            select_mode(RequestedMode::Auto, 2 * MIB, &config()).unwrap(),
            UploadMode::Direct
        );
        assert_eq!(
            select_mode(RequestedMode::Auto, 10 * MIB, &config()).unwrap(),
            UploadMode::Direct
        );
        assert_eq!(
            select_mode(RequestedMode::Auto, 10 * MIB + 1, &config()).unwrap(),
            UploadMode::Server
        );
    }

    #[test]
    fn test_explicit_modes_are_honored() {
        assert_eq!(
            select_mode(RequestedMode::Direct, 2 * MIB, &config()).unwrap(),
            UploadMode::Direct
        );
        assert_eq!(
            select_mode(RequestedMode::Server, 2 * MIB, &config()).unwrap(),
            UploadMode::Server
        );
    }

    #[test]
    fn test_direct_above_limit_downgrades_to_server() {
        // Defaults: direct limit 100 MiB.
        let resolved = select_mode(RequestedMode::Direct, 150 * MIB, &config()).unwrap();
        assert_eq!(resolved, UploadMode::Server);
    }

    #[test]
    fn test_force_server_overrides_request() {
        let cfg = ModeConfig {
            force_server_upload: true,
            ..ModeConfig::default()
        };
        assert_eq!(
            select_mode(RequestedMode::Direct, MIB, &cfg).unwrap(),
            UploadMode::Server
        );
    }

    #[test]
    fn test_direct_disabled_overrides_request() {
        let cfg = ModeConfig {
            enable_direct_upload: false,
            ..ModeConfig::default()
        };
        assert_eq!(
            select_mode(RequestedMode::Auto, MIB, &cfg).unwrap(),
            UploadMode::Server
        );
    }

    #[test]
    fn test_server_limit_is_a_hard_error() {
        // Defaults: server limit 1 GiB.
        let err = select_mode(RequestedMode::Server, 2048 * MIB, &config()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // The downgrade path still enforces the server limit.
        let err = select_mode(RequestedMode::Direct, 2048 * MIB, &config()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
