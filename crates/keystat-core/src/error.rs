//! Unified error types for keystat

use thiserror::Error;

/// Unified error type for all keystat operations
#[derive(Error, Debug)]
pub enum KeystatError {
    // Operator errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Registry errors
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    // Data store errors
    #[error("Store connection error: {0}")]
    StoreConnection(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    // Time-series sink errors
    #[error("Sink write error: {0}")]
    SinkWrite(String),

    /// The sink refused the request itself (bad line protocol, auth)
    #[error("Sink rejected write: {0}")]
    SinkRejected(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl KeystatError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Registry(_) | Self::StoreConnection(_) | Self::SinkWrite(_) | Self::Io(_)
        )
    }
}

/// Result type alias using KeystatError
pub type Result<T> = std::result::Result<T, KeystatError>;
