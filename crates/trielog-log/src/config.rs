use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};

/// Flush/sync strategy for segment appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration shared by the log implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Largest encoded batch the log accepts (default: 1 MiB).
    pub max_batch_bytes: usize,
    /// Sync strategy for file-backed segments.
    pub sync_mode: SyncMode,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: 1024 * 1024,
            sync_mode: SyncMode::default(),
        }
    }
}

/// Check that `stream` is usable as a stream name.
///
/// Names double as segment file names, so only ASCII letters, digits, `.`,
/// `_` and `-` are allowed, and `.`/`..` are rejected.
pub fn validate_stream(stream: &str) -> LogResult<()> {
    let valid = !stream.is_empty()
        && stream != "."
        && stream != ".."
        && stream
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(LogError::InvalidStream(stream.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = LogConfig::default();
        assert_eq!(c.max_batch_bytes, 1024 * 1024);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
    }

    #[test]
    fn stream_names() {
        assert!(validate_stream("nodes").is_ok());
        assert!(validate_stream("state.trie-v2_0").is_ok());
        assert!(validate_stream("").is_err());
        assert!(validate_stream("..").is_err());
        assert!(validate_stream("a/b").is_err());
        assert!(validate_stream("nodes ").is_err());
    }
}
