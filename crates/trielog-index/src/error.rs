//! Error types for the index crate.

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Journal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The index was closed and accepts no further operations.
    #[error("index is closed")]
    Closed,
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
