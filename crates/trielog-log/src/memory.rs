use std::collections::HashMap;

use parking_lot::RwLock;
use trielog_types::{Offset, StreamPartition};

use crate::batch::{fetch_window, prepare, BatchPosition};
use crate::config::{validate_stream, LogConfig};
use crate::error::LogResult;
use crate::record::{Compression, Record, RecordBatch};
use crate::traits::{AppendResult, NodeLog};

#[derive(Default)]
struct MemoryStream {
    positions: Vec<BatchPosition>,
    batches: Vec<Vec<u8>>,
    next_offset: Offset,
}

/// In-memory log.
///
/// Intended for tests and embedding. Batches are held in their encoded form
/// so reads go through the same decoder as the file-backed log, and the
/// `max_batch_bytes` limit is enforced on real encoded sizes.
pub struct MemoryLog {
    config: LogConfig,
    streams: RwLock<HashMap<String, MemoryStream>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::with_config(LogConfig::default())
    }

    pub fn with_config(config: LogConfig) -> Self {
        Self {
            config,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Record count of every batch in `stream`, in append order.
    pub fn batch_record_counts(&self, stream: &str) -> Vec<usize> {
        let streams = self.streams.read();
        streams
            .get(stream)
            .map(|s| {
                s.positions
                    .iter()
                    .map(|p| (p.last_offset - p.base_offset + 1) as usize)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total encoded bytes held for `stream`.
    pub fn stream_bytes(&self, stream: &str) -> usize {
        let streams = self.streams.read();
        streams
            .get(stream)
            .map(|s| s.positions.iter().map(|p| p.size).sum())
            .unwrap_or(0)
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeLog for MemoryLog {
    fn append(
        &self,
        stream: &str,
        records: &[Record],
        compression: Compression,
    ) -> LogResult<HashMap<StreamPartition, AppendResult>> {
        validate_stream(stream)?;
        let mut streams = self.streams.write();
        let state = streams.entry(stream.to_string()).or_default();

        let result = match prepare(state.next_offset, records, compression, self.config.max_batch_bytes)? {
            Ok(prepared) => {
                state.positions.push(BatchPosition {
                    base_offset: prepared.first_offset,
                    last_offset: prepared.last_offset,
                    position: state.batches.len() as u64,
                    size: prepared.encoded.len(),
                });
                state.next_offset = prepared.last_offset + 1;
                let result = prepared.result();
                state.batches.push(prepared.encoded);
                result
            }
            Err(refused) => refused,
        };

        Ok(HashMap::from([(StreamPartition::primary(stream), result)]))
    }

    fn read_from(&self, stream: &str, offset: Offset, max_bytes: usize) -> LogResult<Vec<RecordBatch>> {
        let streams = self.streams.read();
        let Some(state) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        fetch_window(&state.positions, offset, max_bytes)
            .iter()
            .map(|p| RecordBatch::decode(&state.batches[p.position as usize], p.position))
            .collect()
    }

    fn end_offset(&self, stream: &str) -> LogResult<Offset> {
        Ok(self
            .streams
            .read()
            .get(stream)
            .map(|s| s.next_offset)
            .unwrap_or(0))
    }
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let streams = self.streams.read();
        f.debug_struct("MemoryLog")
            .field("stream_count", &streams.len())
            .field("max_batch_bytes", &self.config.max_batch_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;

    fn node(i: u8, len: usize) -> Record {
        Record::new(vec![i; 32], vec![i; len])
    }

    fn appended(result: &HashMap<StreamPartition, AppendResult>, stream: &str) -> (Offset, Offset) {
        match result.get(&StreamPartition::primary(stream)) {
            Some(AppendResult::Appended {
                first_offset,
                last_offset,
                ..
            }) => (*first_offset, *last_offset),
            other => panic!("unexpected append result: {other:?}"),
        }
    }

    #[test]
    fn offsets_are_dense_per_stream() {
        let log = MemoryLog::new();
        let r1 = log.append("nodes", &[node(1, 10), node(2, 10)], Compression::None).unwrap();
        let r2 = log.append("nodes", &[node(3, 10)], Compression::None).unwrap();
        let other = log.append("storage", &[node(4, 10)], Compression::None).unwrap();

        assert_eq!(appended(&r1, "nodes"), (0, 1));
        assert_eq!(appended(&r2, "nodes"), (2, 2));
        assert_eq!(appended(&other, "storage"), (0, 0));
        assert_eq!(log.end_offset("nodes").unwrap(), 3);
        assert_eq!(log.end_offset("unknown").unwrap(), 0);
        assert_eq!(log.batch_record_counts("nodes"), vec![2, 1]);
    }

    #[test]
    fn read_returns_whole_containing_batch() {
        let log = MemoryLog::new();
        log.append("nodes", &[node(1, 10), node(2, 10), node(3, 10)], Compression::None)
            .unwrap();
        let batches = log.read_from("nodes", 2, 1).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].base_offset, 0);
        assert_eq!(batches[0].records[2].value.as_deref(), Some(&[3u8; 10][..]));
    }

    #[test]
    fn read_past_end_is_empty() {
        let log = MemoryLog::new();
        log.append("nodes", &[node(1, 10)], Compression::None).unwrap();
        assert!(log.read_from("nodes", 1, 4096).unwrap().is_empty());
        assert!(log.read_from("missing", 0, 4096).unwrap().is_empty());
    }

    #[test]
    fn oversize_batch_is_refused_without_consuming_offsets() {
        let log = MemoryLog::with_config(LogConfig {
            max_batch_bytes: 256,
            ..LogConfig::default()
        });
        let result = log.append("nodes", &[node(1, 1024)], Compression::None).unwrap();
        assert!(matches!(
            result.get(&StreamPartition::primary("nodes")),
            Some(AppendResult::Failed { .. })
        ));
        assert_eq!(log.end_offset("nodes").unwrap(), 0);

        let result = log.append("nodes", &[node(2, 16)], Compression::None).unwrap();
        assert_eq!(appended(&result, "nodes"), (0, 0));
    }

    #[test]
    fn invalid_stream_is_an_error() {
        let log = MemoryLog::new();
        assert!(matches!(
            log.append("../etc", &[node(1, 1)], Compression::None),
            Err(LogError::InvalidStream(_))
        ));
    }

    #[test]
    fn read_range_skips_records_before_from() {
        let log = MemoryLog::new();
        log.append("nodes", &[node(1, 4), node(2, 4), node(3, 4)], Compression::None)
            .unwrap();
        log.append("nodes", &[node(4, 4)], Compression::Zstd).unwrap();

        let chunk = log.read_range("nodes", 1, usize::MAX).unwrap();
        let offsets: Vec<Offset> = chunk.records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![1, 2, 3]);
        assert_eq!(chunk.next_offset, 4);

        let tail = log.read_range("nodes", 4, usize::MAX).unwrap();
        assert!(tail.records.is_empty());
        assert_eq!(tail.next_offset, 4);
    }
}
