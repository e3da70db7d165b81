//! Error types for daybook.

use thiserror::Error;

/// Main error type for the daybook library.
#[derive(Error, Debug)]
pub enum DaybookError {
    /// `SQLite` failure, with context.
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Key/value store failure (write rejected, quota exceeded, ...)
    #[error("storage error: {0}")]
    Storage(String),

    /// Operation kind that is not create, update or delete
    #[error("unknown operation kind: {0}")]
    UnknownOperation(String),

    /// Target domain outside the dashboard's domains
    #[error("unknown target domain: {0}")]
    UnknownDomain(String),

    /// Requested item does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP client construction or transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for daybook.
pub type Result<T> = std::result::Result<T, DaybookError>;
