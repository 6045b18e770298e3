//! Error types for Mnemo

use thiserror::Error;

/// Result type alias for Mnemo operations
pub type Result<T> = std::result::Result<T, MnemoError>;

/// Main error type for Mnemo
#[derive(Error, Debug)]
pub enum MnemoError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MnemoError {
    /// Stable kind label carried on user-visible failures
    pub fn kind(&self) -> &'static str {
        match self {
            MnemoError::Validation(_) => "validation",
            MnemoError::NotFound(_) => "not_found",
            MnemoError::Conflict(_) => "conflict",
            MnemoError::ResourceExhausted(_) => "resource_exhausted",
            MnemoError::Database(_) | MnemoError::Storage(_) | MnemoError::Serialization(_) => {
                "storage"
            }
            MnemoError::Dependency(_) | MnemoError::Io(_) => "dependency",
        }
    }

    /// True for errors a caller can fix by changing the request
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MnemoError::Validation(_)
                | MnemoError::NotFound(_)
                | MnemoError::Conflict(_)
                | MnemoError::ResourceExhausted(_)
        )
    }
}
