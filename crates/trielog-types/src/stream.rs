use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a record within a log stream.
///
/// Offsets are assigned by the log at append time, start at zero, and grow
/// by one per record.
pub type Offset = u64;

/// A partition of a named log stream.
///
/// The log reports append results per partition. trielog writes every node
/// of a store to partition 0 of its stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamPartition {
    pub stream: String,
    pub partition: u32,
}

impl StreamPartition {
    pub fn new(stream: impl Into<String>, partition: u32) -> Self {
        Self {
            stream: stream.into(),
            partition,
        }
    }

    /// Partition 0 of `stream`.
    pub fn primary(stream: impl Into<String>) -> Self {
        Self::new(stream, 0)
    }
}

impl fmt::Display for StreamPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stream, self.partition)
    }
}
