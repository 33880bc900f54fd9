//! Error types for storage operations

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection failed
    #[error("failed to connect to storage backend: {0}")]
    ConnectionFailed(String),

    /// Database query failed
    #[error("storage query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid configuration
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// A stored value could not be decoded
    #[error("stored value could not be decoded: {0}")]
    SerializationError(String),

    /// Referenced row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique key (e.g. a target name) is already taken
    #[error("already exists: {0}")]
    Conflict(String),

    /// I/O error (file access, etc.)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::RowNotFound => StorageError::NotFound("no rows found".to_string()),
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
