use bytes::Bytes;
use trielog_log::{record_size_in_bytes, Compression, RECORD_BATCH_OVERHEAD};
use trielog_types::NodeKey;

/// Floor of the compressed-size estimate.
pub(crate) const MIN_COMPRESSED_ESTIMATE: usize = 1024;
/// Ceiling of the compressed-size estimate.
pub(crate) const MAX_COMPRESSED_ESTIMATE: usize = 64 * 1024;

/// Splits a write into batches the log will accept and readers can fetch.
///
/// The running size of a batch mirrors the log's own accounting: the fixed
/// batch overhead plus the exact encoded size of each record at its offset
/// delta within the batch. Node records carry no headers and share one
/// timestamp, so the timestamp delta is always zero.
#[derive(Clone, Copy, Debug)]
pub struct BatchSizer {
    max_fetch_bytes: usize,
    compression: Compression,
}

impl BatchSizer {
    pub fn new(max_fetch_bytes: usize, compression: Compression) -> Self {
        Self {
            max_fetch_bytes,
            compression,
        }
    }

    /// Estimated on-log size of a batch whose uncompressed size is `size`.
    ///
    /// Compressed batches are assumed to halve, bounded to `1 KiB..=64 KiB`.
    pub fn estimate(&self, size: usize) -> usize {
        match self.compression {
            Compression::None => size,
            Compression::Zstd => (size / 2).clamp(MIN_COMPRESSED_ESTIMATE, MAX_COMPRESSED_ESTIMATE),
        }
    }

    /// Encoded size of the record for `(key, value)` at `offset_delta`.
    pub fn record_size(offset_delta: usize, key: &NodeKey, value: &[u8]) -> usize {
        record_size_in_bytes(offset_delta as i32, 0, Some(key.as_bytes()), Some(value), &[])
    }

    /// Exact uncompressed size of a batch holding `entries`.
    pub fn batch_size(entries: &[(NodeKey, Bytes)]) -> usize {
        RECORD_BATCH_OVERHEAD
            + entries
                .iter()
                .enumerate()
                .map(|(delta, (key, value))| Self::record_size(delta, key, value))
                .sum::<usize>()
    }

    /// Split `entries` into consecutive batches, preserving order.
    ///
    /// An entry joins the open batch when the estimate with it included is
    /// strictly below `max_fetch_bytes`; otherwise it starts the next batch.
    /// The first entry of a batch always joins it, so a single oversize node
    /// gets a batch of its own.
    pub fn partition<'a>(&self, entries: &'a [(NodeKey, Bytes)]) -> Vec<&'a [(NodeKey, Bytes)]> {
        let mut batches = Vec::new();
        let mut start = 0;
        let mut size = RECORD_BATCH_OVERHEAD;

        for (i, (key, value)) in entries.iter().enumerate() {
            let grown = size + Self::record_size(i - start, key, value);
            if i == start || self.estimate(grown) < self.max_fetch_bytes {
                size = grown;
                continue;
            }
            batches.push(&entries[start..i]);
            start = i;
            size = RECORD_BATCH_OVERHEAD + Self::record_size(0, key, value);
        }
        if start < entries.len() {
            batches.push(&entries[start..]);
        }
        batches
    }
}
