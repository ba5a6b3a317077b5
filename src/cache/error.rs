//! Cache error types.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache operation failed: {0}")]
    Operation(String),

    #[error("Cache connection failed: {0}")]
    Connection(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Whether the error is a transport-level fault worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Connection(_) | CacheError::Timeout(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    /// Transport faults, rejected credentials and bad client settings all
    /// surface as `Connection` so they get the retry policy; server replies
    /// such as WRONGTYPE do not.
    fn from(err: redis::RedisError) -> Self {
        let setup_failure = matches!(
            err.kind(),
            redis::ErrorKind::AuthenticationFailed | redis::ErrorKind::InvalidClientConfig
        );
        if setup_failure
            || err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Operation(err.to_string())
        }
    }
}
