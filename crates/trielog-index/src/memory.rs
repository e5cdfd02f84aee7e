use std::collections::HashMap;

use trielog_types::Offset;

use crate::entry::IndexEntry;
use crate::error::{IndexError, IndexResult};
use crate::traits::OffsetIndex;

/// In-memory fingerprint index.
#[derive(Default)]
pub struct MemoryIndex {
    offsets: HashMap<Vec<u8>, Vec<Offset>>,
    pairs: usize,
    closed: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, entry: &IndexEntry) -> bool {
        self.offsets
            .get(&entry.fingerprint)
            .is_some_and(|offsets| offsets.contains(&entry.offset))
    }

    /// Insert one pair; returns `false` if it was already present.
    pub(crate) fn insert(&mut self, entry: &IndexEntry) -> bool {
        let offsets = self.offsets.entry(entry.fingerprint.clone()).or_default();
        if offsets.contains(&entry.offset) {
            return false;
        }
        offsets.push(entry.offset);
        self.pairs += 1;
        true
    }

    /// Number of distinct fingerprints.
    pub fn fingerprint_count(&self) -> usize {
        self.offsets.len()
    }
}

impl OffsetIndex for MemoryIndex {
    fn lookup(&self, fingerprint: &[u8]) -> IndexResult<Vec<Offset>> {
        if self.closed {
            return Err(IndexError::Closed);
        }
        Ok(self.offsets.get(fingerprint).cloned().unwrap_or_default())
    }

    fn bulk_upsert(&mut self, entries: &[IndexEntry]) -> IndexResult<()> {
        if self.closed {
            return Err(IndexError::Closed);
        }
        for entry in entries {
            self.insert(entry);
        }
        Ok(())
    }

    fn close(&mut self) -> IndexResult<()> {
        self.closed = true;
        Ok(())
    }

    fn len(&self) -> usize {
        self.pairs
    }
}

impl std::fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndex")
            .field("fingerprint_count", &self.offsets.len())
            .field("pairs", &self.pairs)
            .field("closed", &self.closed)
            .finish()
    }
}
