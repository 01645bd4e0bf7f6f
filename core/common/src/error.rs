//! Common error types for decksync.

use thiserror::Error;

/// Top-level error type for decksync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing resource for a content batch does not exist.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// A content batch lacks columns its content type requires.
    #[error("Missing columns {missing:?} in {file}")]
    MissingColumns {
        /// Source that was loaded.
        file: String,
        /// Required columns absent from the source header.
        missing: Vec<String>,
    },

    /// The remote store could not be reached (connection refused, timeout, bad channel).
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The remote store answered with a protocol-level error.
    #[error("Store error in {action}: {message}")]
    Store {
        /// Protocol action that was rejected.
        action: String,
        /// Error text returned by the store.
        message: String,
    },

    /// Media lookup or generation failed.
    #[error("Media resolution failed: {0}")]
    MediaResolution(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a store error for a protocol action.
    pub fn store(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the transport rather than the protocol.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Whether this error makes a whole content batch unusable.
    ///
    /// Such errors skip the batch; orchestration continues with the next one.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::SourceNotFound(_) | Self::MissingColumns { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
