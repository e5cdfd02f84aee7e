//! Append-only record log for trielog.
//!
//! Nodes are appended to named streams as record batches and read back by
//! offset. The batch layout follows the Kafka v2 record-batch format, so the
//! size of a batch can be predicted exactly from the records it will hold.
//!
//! # Architecture
//!
//! - [`NodeLog`] -- the interface the node store depends on
//! - [`RecordBatch`] / [`Record`] -- wire format and size accounting
//! - [`MemoryLog`] -- in-process log for tests and embedding
//! - [`FileLog`] -- one segment file per stream, recovered on open
//!
//! Offsets are dense per stream: a batch of `n` records appended at end
//! offset `e` occupies `e..e + n`.

mod batch;
pub mod config;
pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod traits;
pub mod varint;

pub use config::{validate_stream, LogConfig, SyncMode};
pub use error::{LogError, LogResult};
pub use file::FileLog;
pub use memory::MemoryLog;
pub use record::{
    record_size_in_bytes, Compression, Header, Record, RecordBatch, StoredRecord,
    RECORD_BATCH_OVERHEAD,
};
pub use traits::{AppendResult, NodeLog, ReplayChunk, ReplayRecord};
