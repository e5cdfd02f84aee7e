use trielog_types::Offset;

use crate::entry::IndexEntry;
use crate::error::IndexResult;

/// Fingerprint to offsets map used to locate nodes in the log.
///
/// Implementations must satisfy these invariants:
/// - Every offset upserted under a fingerprint stays there; colliding
///   fingerprints accumulate offsets rather than replacing them.
/// - Upserting a `(fingerprint, offset)` pair that is already present is a
///   no-op.
/// - After [`OffsetIndex::close`], every operation returns
///   [`crate::IndexError::Closed`].
pub trait OffsetIndex: Send + Sync {
    /// All offsets recorded under `fingerprint`, in no particular order.
    fn lookup(&self, fingerprint: &[u8]) -> IndexResult<Vec<Offset>>;

    /// Record every entry. Durable implementations persist the whole call
    /// before returning.
    fn bulk_upsert(&mut self, entries: &[IndexEntry]) -> IndexResult<()>;

    /// Flush and release resources.
    fn close(&mut self) -> IndexResult<()>;

    /// Number of distinct `(fingerprint, offset)` pairs.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
