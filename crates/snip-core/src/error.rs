use thiserror::Error;

/// Errors related to the core value types.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

/// Errors raised by storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The short code already maps to a different URL.
    #[error("short code already maps to a different url: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// Errors surfaced by the shortening service to outer layers.
///
/// Each variant corresponds to one class of caller-visible outcome so an
/// adapter (HTTP, gRPC, CLI) can map it to its own status codes.
#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code has been deleted: {0}")]
    Gone(String),
    #[error("short code collision: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(code) => Self::Conflict(code),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::Validation(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_conflict_maps_to_shortener_conflict() {
        let err: ShortenerError = StorageError::Conflict("abc".to_string()).into();
        assert!(matches!(err, ShortenerError::Conflict(code) if code == "abc"));
    }

    #[test]
    fn other_storage_errors_are_wrapped_not_swallowed() {
        let err: ShortenerError = StorageError::Unavailable("db down".to_string()).into();
        match err {
            ShortenerError::Storage(message) => assert!(message.contains("db down")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_short_code_is_a_validation_error() {
        let err: ShortenerError = CoreError::InvalidShortCode("bad".to_string()).into();
        assert!(matches!(err, ShortenerError::Validation(_)));
    }
}
