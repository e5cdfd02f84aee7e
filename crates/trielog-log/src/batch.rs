//! Bookkeeping shared by the log implementations: where each batch lives and
//! how an append is turned into encoded bytes.

use trielog_types::Offset;

use crate::error::LogResult;
use crate::record::{now_millis, Compression, Record, RecordBatch};
use crate::traits::AppendResult;

/// Location of one encoded batch within a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BatchPosition {
    pub base_offset: Offset,
    pub last_offset: Offset,
    /// Byte position in the segment (file log) or slot index (memory log).
    pub position: u64,
    pub size: usize,
}

/// Batches to return for a read at `offset`: the batch containing it, then
/// following batches while the running size stays within `max_bytes`.
pub(crate) fn fetch_window(positions: &[BatchPosition], offset: Offset, max_bytes: usize) -> &[BatchPosition] {
    let start = positions.partition_point(|p| p.last_offset < offset);
    if start == positions.len() {
        return &[];
    }
    let mut total = positions[start].size;
    let mut end = start + 1;
    while end < positions.len() && total + positions[end].size <= max_bytes {
        total += positions[end].size;
        end += 1;
    }
    &positions[start..end]
}

/// An append that passed the log's own checks.
pub(crate) struct PreparedBatch {
    pub encoded: Vec<u8>,
    pub first_offset: Offset,
    pub last_offset: Offset,
    pub count: usize,
}

/// Encode `records` at `base_offset`, or explain why the log refuses them.
pub(crate) fn prepare(
    base_offset: Offset,
    records: &[Record],
    compression: Compression,
    max_batch_bytes: usize,
) -> LogResult<Result<PreparedBatch, AppendResult>> {
    if records.is_empty() {
        return Ok(Err(AppendResult::Failed {
            error: "empty batch".into(),
        }));
    }
    let batch = RecordBatch::from_records(base_offset, now_millis(), compression, records);
    let encoded = batch.encode()?;
    if encoded.len() > max_batch_bytes {
        return Ok(Err(AppendResult::Failed {
            error: format!(
                "batch of {} bytes exceeds the maximum of {max_batch_bytes}",
                encoded.len()
            ),
        }));
    }
    Ok(Ok(PreparedBatch {
        encoded,
        first_offset: base_offset,
        last_offset: base_offset + records.len() as u64 - 1,
        count: records.len(),
    }))
}

impl PreparedBatch {
    pub fn result(&self) -> AppendResult {
        AppendResult::Appended {
            first_offset: self.first_offset,
            last_offset: self.last_offset,
            message_count: self.count,
        }
    }
}
