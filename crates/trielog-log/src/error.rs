use std::io;

use trielog_types::Offset;

/// Errors produced by the log subsystem.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// I/O error during segment file operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A batch could not be decoded.
    #[error("corrupt batch at position {position}: {reason}")]
    CorruptBatch { position: u64, reason: String },

    /// CRC integrity check failed for a batch.
    #[error("CRC mismatch in batch at base offset {base_offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        base_offset: Offset,
        expected: u32,
        actual: u32,
    },

    /// Batch was written with a record format this log does not read.
    #[error("unsupported batch magic {0}")]
    UnsupportedMagic(i8),

    /// Batch attributes name a compression codec this log does not know.
    #[error("unknown compression codec {0}")]
    UnknownCompression(i16),

    /// Compressing or decompressing the record section failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// A variable-length integer ran past the end of its buffer or overflowed.
    #[error("malformed varint: {0}")]
    Varint(&'static str),

    /// Stream names are used as file names and must be plain identifiers.
    #[error("invalid stream name: {0:?}")]
    InvalidStream(String),
}

/// Convenience alias used throughout the log crate.
pub type LogResult<T> = std::result::Result<T, LogError>;
