use serde::{Deserialize, Serialize};
use trielog_types::{NodeKey, Offset};

/// One index entry: the log offset of a record whose key starts with
/// `fingerprint`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fingerprint: Vec<u8>,
    pub offset: Offset,
}

impl IndexEntry {
    pub fn new(fingerprint: impl Into<Vec<u8>>, offset: Offset) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            offset,
        }
    }

    /// Entry for `key` stored at `offset`, fingerprinted to `len` bytes.
    pub fn for_key(key: &NodeKey, len: usize, offset: Offset) -> Self {
        Self::new(key.fingerprint(len), offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_key_takes_prefix() {
        let key = NodeKey::from_hash([0x5a; 32]);
        let entry = IndexEntry::for_key(&key, 4, 17);
        assert_eq!(entry.fingerprint, vec![0x5a; 4]);
        assert_eq!(entry.offset, 17);
    }
}
