use std::path::Path;

use serde::{Deserialize, Serialize};
use trielog_log::{record_size_in_bytes, validate_stream, Compression, RECORD_BATCH_OVERHEAD};
use trielog_types::KEY_LEN;

use crate::error::{StoreError, StoreResult};
use crate::sizer::MAX_COMPRESSED_ESTIMATE;

/// Per-store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Log stream holding this store's nodes.
    pub stream: String,
    /// Maximum number of nodes held in the read cache.
    pub cache_capacity: usize,
    /// Upper bound for one log read and for the estimated size of one
    /// appended batch. With compression it may not exceed the largest
    /// compressed-size estimate, or no batch would ever be closed.
    pub max_fetch_bytes: usize,
    /// Compression requested for appended batches.
    pub compression: Compression,
    /// Number of leading key bytes used as the index key.
    pub fingerprint_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stream: "nodes".to_string(),
            cache_capacity: 10_000,
            max_fetch_bytes: 1024 * 1024,
            compression: Compression::None,
            fingerprint_len: 4,
        }
    }
}

impl StoreConfig {
    /// Config for `stream` with every other field at its default.
    pub fn for_stream(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            ..Self::default()
        }
    }

    /// Smallest usable `max_fetch_bytes`: one batch holding one node with an
    /// empty value.
    pub fn min_fetch_bytes() -> usize {
        RECORD_BATCH_OVERHEAD + record_size_in_bytes(0, 0, Some(&[0u8; KEY_LEN][..]), Some(&[][..]), &[])
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.stream.is_empty() {
            return Err(StoreError::Config("stream name is empty".into()));
        }
        validate_stream(&self.stream).map_err(|e| StoreError::Config(e.to_string()))?;
        if self.cache_capacity == 0 {
            return Err(StoreError::Config("cache_capacity must be at least 1".into()));
        }
        let min = Self::min_fetch_bytes();
        if self.max_fetch_bytes < min {
            return Err(StoreError::Config(format!(
                "max_fetch_bytes {} is below the minimum of {min}",
                self.max_fetch_bytes
            )));
        }
        if self.compression != Compression::None && self.max_fetch_bytes > MAX_COMPRESSED_ESTIMATE {
            return Err(StoreError::Config(format!(
                "max_fetch_bytes {} exceeds {MAX_COMPRESSED_ESTIMATE}, the largest compressed batch estimate",
                self.max_fetch_bytes
            )));
        }
        if !(1..=KEY_LEN).contains(&self.fingerprint_len) {
            return Err(StoreError::Config(format!(
                "fingerprint_len {} must be within 1..={KEY_LEN}",
                self.fingerprint_len
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.stream, "nodes");
        assert_eq!(c.cache_capacity, 10_000);
        assert_eq!(c.max_fetch_bytes, 1024 * 1024);
        assert_eq!(c.compression, Compression::None);
        assert_eq!(c.fingerprint_len, 4);
        c.validate().unwrap();
    }

    #[test]
    fn min_fetch_bytes_fits_one_empty_node() {
        // 61 byte header + 39 byte record (1 length, 1 attributes, 1 timestamp
        // delta, 1 offset delta, 33 key, 1 value length, 1 header count).
        assert_eq!(StoreConfig::min_fetch_bytes(), 100);
    }

    #[test]
    fn toml_overrides_defaults() {
        let c = StoreConfig::from_toml_str(
            r#"
            stream = "storage"
            max_fetch_bytes = 4096
            compression = "zstd"
            "#,
        )
        .unwrap();
        assert_eq!(c.stream, "storage");
        assert_eq!(c.max_fetch_bytes, 4096);
        assert_eq!(c.compression, Compression::Zstd);
        assert_eq!(c.cache_capacity, 10_000);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            StoreConfig::for_stream(""),
            StoreConfig::for_stream("a/b"),
            StoreConfig {
                cache_capacity: 0,
                ..StoreConfig::default()
            },
            StoreConfig {
                max_fetch_bytes: 99,
                ..StoreConfig::default()
            },
            StoreConfig {
                fingerprint_len: 0,
                ..StoreConfig::default()
            },
            StoreConfig {
                fingerprint_len: 33,
                ..StoreConfig::default()
            },
            StoreConfig {
                compression: Compression::Zstd,
                ..StoreConfig::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(StoreError::Config(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn compressed_fetch_size_is_capped() {
        let at_cap = StoreConfig {
            compression: Compression::Zstd,
            max_fetch_bytes: MAX_COMPRESSED_ESTIMATE,
            ..StoreConfig::default()
        };
        at_cap.validate().unwrap();
        let over = StoreConfig {
            max_fetch_bytes: MAX_COMPRESSED_ESTIMATE + 1,
            ..at_cap.clone()
        };
        assert!(matches!(over.validate(), Err(StoreError::Config(_))));
        assert!(StoreConfig::from_toml_str(r#"compression = "zstd""#).is_err());
    }

    #[test]
    fn unknown_compression_is_rejected() {
        assert!(StoreConfig::from_toml_str(r#"compression = "lz4""#).is_err());
    }
}
