/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use almon_storage::error::StoreError;
///
/// let err = StoreError::Other("cursor override row malformed".to_string());
/// assert!(err.to_string().contains("cursor override"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An underlying SQLite error.
    #[error("Store: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (raw_data column).
    #[error("Store: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while preparing the database location.
    #[error("Store: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Store: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
