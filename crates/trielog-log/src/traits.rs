use std::collections::HashMap;

use bytes::Bytes;
use trielog_types::{Offset, StreamPartition};

use crate::error::LogResult;
use crate::record::{Compression, Record, RecordBatch};

/// Outcome of appending one batch to one stream partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppendResult {
    /// The batch is durable at `first_offset..=last_offset`.
    Appended {
        first_offset: Offset,
        last_offset: Offset,
        message_count: usize,
    },
    /// The log refused or failed to store the batch.
    Failed { error: String },
}

/// A record returned by the bulk replay query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayRecord {
    pub offset: Offset,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// One page of a forward scan over a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayChunk {
    /// Offset to pass as `from` for the next page.
    pub next_offset: Offset,
    pub records: Vec<ReplayRecord>,
}

/// Append-only log of record batches, organized in named streams.
///
/// Implementations must satisfy these invariants:
/// - Offsets in a stream are dense and increasing; a record keeps its offset
///   forever.
/// - One `append` call produces one batch. It succeeds or fails as a unit.
/// - All methods may be called concurrently from many threads.
pub trait NodeLog: Send + Sync {
    /// Append `records` as one batch to partition 0 of `stream`.
    ///
    /// A batch the log refuses (too large, empty) is reported as
    /// [`AppendResult::Failed`] in the returned map. `Err` is reserved for
    /// failures of the log itself, such as I/O errors.
    fn append(
        &self,
        stream: &str,
        records: &[Record],
        compression: Compression,
    ) -> LogResult<HashMap<StreamPartition, AppendResult>>;

    /// Read batches starting with the one that contains `offset`.
    ///
    /// The first batch may start before `offset`. Further batches are added
    /// while the total encoded size stays within `max_bytes`; the first batch
    /// is always returned so a reader can make progress. An offset at or past
    /// the end of the stream yields no batches.
    fn read_from(&self, stream: &str, offset: Offset, max_bytes: usize) -> LogResult<Vec<RecordBatch>>;

    /// Offset that the next appended record will receive.
    fn end_offset(&self, stream: &str) -> LogResult<Offset>;

    /// Forward scan used for replay and sync: records at or after `from`.
    fn read_range(&self, stream: &str, from: Offset, max_bytes: usize) -> LogResult<ReplayChunk> {
        let batches = self.read_from(stream, from, max_bytes)?;
        let records: Vec<ReplayRecord> = batches
            .into_iter()
            .flat_map(|batch| batch.records)
            .filter(|record| record.offset >= from)
            .map(|record| ReplayRecord {
                offset: record.offset,
                key: record.key,
                value: record.value,
            })
            .collect();
        let next_offset = records.last().map(|r| r.offset + 1).unwrap_or(from);
        Ok(ReplayChunk {
            next_offset,
            records,
        })
    }
}
