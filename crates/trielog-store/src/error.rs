use trielog_index::IndexError;
use trielog_log::LogError;

/// Errors from node store operations.
///
/// A missing node is not an error: lookups return `Ok(None)`. Neither is a
/// candidate whose bytes fail hash verification; it is treated as a miss.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The log failed outside of a per-batch append result.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// The secondary index failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `stop` was called; the store accepts no further reads or writes.
    #[error("store is stopped")]
    Stopped,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
