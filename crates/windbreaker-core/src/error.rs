use thiserror::Error;

/// Canonical error type for the consumed store interfaces.
///
/// These errors never escape the breaker's public methods; they are logged
/// and degraded around (fail-open on reads, best-effort on writes).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached, or the call timed out.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Human-readable transport failure details.
        message: String,
    },

    /// Backend answered but the stored value could not be interpreted.
    #[error("malformed value for key `{key}`: {message}")]
    MalformedValue {
        /// Key whose value failed to parse.
        key: String,
        /// What was wrong with the value.
        message: String,
    },

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StoreError {
    /// Creates an `Unavailable` variant.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a `MalformedValue` variant.
    #[must_use]
    pub fn malformed_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Convenient result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
