use trielog_types::NodeKey;

/// Hash function used for content addressing.
///
/// Implementations must be deterministic and collision resistant: the store
/// treats `hash(value) == key` as proof that `value` is the node named `key`.
pub trait NodeHasher: Send + Sync {
    /// Hash raw bytes into a node key.
    fn hash(&self, data: &[u8]) -> NodeKey;

    /// Check that `data` hashes to `expected`.
    fn verify(&self, data: &[u8], expected: &NodeKey) -> bool {
        self.hash(data) == *expected
    }
}

/// BLAKE3 content hasher; node keys are the hash of the bytes as-is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContentHasher;

impl ContentHasher {
    pub const PLAIN: Self = Self;

    /// Raw BLAKE3 hash of `data`.
    pub fn raw_hash(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }
}

impl NodeHasher for ContentHasher {
    fn hash(&self, data: &[u8]) -> NodeKey {
        NodeKey::from_hash(Self::raw_hash(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"branch node";
        assert_eq!(ContentHasher::PLAIN.hash(data), ContentHasher::PLAIN.hash(data));
    }

    #[test]
    fn plain_hash_is_raw_blake3() {
        let key = ContentHasher::PLAIN.hash(b"leaf");
        assert_eq!(key.as_bytes(), &ContentHasher::raw_hash(b"leaf"));
    }

    #[test]
    fn verify_correct_data() {
        let key = ContentHasher::PLAIN.hash(b"extension node");
        assert!(ContentHasher::PLAIN.verify(b"extension node", &key));
    }

    #[test]
    fn verify_incorrect_data() {
        let key = ContentHasher::PLAIN.hash(b"original");
        assert!(!ContentHasher::PLAIN.verify(b"tampered", &key));
    }
}
