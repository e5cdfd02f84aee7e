use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::stream::Offset;

/// A stored value together with the log offset that durably holds it.
///
/// Lookups return a `TVal` so callers can tell "found" apart from "found,
/// and here is where".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TVal {
    /// The node's encoded bytes.
    pub value: Bytes,
    /// Offset of the record in the store's log stream.
    pub offset: Offset,
}

impl TVal {
    pub fn new(value: impl Into<Bytes>, offset: Offset) -> Self {
        Self {
            value: value.into(),
            offset,
        }
    }

    /// Size of the value in bytes.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}
