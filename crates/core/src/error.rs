use thiserror::Error;

/// Unified error type for the upload pipeline.
///
/// The taxonomy matters to the retry layer: [`Error::is_retryable`] decides
/// whether an operation may be re-attempted at all, before any per-policy
/// retry condition is consulted. Validation, ownership, and permanent
/// failures are never retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("upload session not found: {0}")]
    SessionNotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("circuit open for operation '{operation}'")]
    CircuitOpen { operation: String },

    #[error("operation '{operation}' timed out")]
    Timeout { operation: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the retry layer is allowed to re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transient(_) | Error::Timeout { .. } | Error::Io(_)
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Transient("blip".into()).is_retryable());
        assert!(
            Error::Timeout {
                operation: "put".into()
            }
            .is_retryable()
        );
        assert!(Error::Io(std::io::Error::other("disk")).is_retryable());

        assert!(!Error::Validation("bad".into()).is_retryable());
        assert!(!Error::Permission("nope".into()).is_retryable());
        assert!(!Error::SessionNotFound("id".into()).is_retryable());
        assert!(!Error::Permanent("gone".into()).is_retryable());
        assert!(
            !Error::CircuitOpen {
                operation: "put".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display_includes_operation() {
        let err = Error::CircuitOpen {
            operation: "upload-complete-file".into(),
        };
        assert!(err.to_string().contains("upload-complete-file"));
        assert!(err.is_circuit_open());
    }
}
