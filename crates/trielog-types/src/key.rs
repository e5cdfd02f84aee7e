use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length in bytes of a [`NodeKey`].
pub const KEY_LEN: usize = 32;

/// Content-addressed key of a trie node.
///
/// A `NodeKey` is the hash of the node's encoded bytes. Identical content
/// always produces the same key, so a key both names a node and lets any
/// reader check that the bytes it got back are the bytes that were stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey([u8; KEY_LEN]);

impl NodeKey {
    /// Create a `NodeKey` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; KEY_LEN]) -> Self {
        Self(hash)
    }

    /// Create a `NodeKey` from a slice, which must be exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Leading `len` bytes of the key, used as the secondary-index key.
    ///
    /// `len` is clamped to [`KEY_LEN`]. A short fingerprint keeps the index
    /// small at the price of collisions, which readers resolve by hashing.
    pub fn fingerprint(&self, len: usize) -> &[u8] {
        &self.0[..len.min(KEY_LEN)]
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", self.short_hex())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; KEY_LEN]> for NodeKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<NodeKey> for [u8; KEY_LEN] {
    fn from(key: NodeKey) -> Self {
        key.0
    }
}

impl AsRef<[u8]> for NodeKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = NodeKey::from_slice(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: KEY_LEN,
                actual: 3
            }
        );
    }

    #[test]
    fn fingerprint_is_prefix() {
        let mut raw = [0u8; KEY_LEN];
        raw[0] = 0xde;
        raw[1] = 0xad;
        raw[2] = 0xbe;
        raw[3] = 0xef;
        raw[4] = 0x01;
        let key = NodeKey::from_hash(raw);
        assert_eq!(key.fingerprint(4), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(key.fingerprint(64).len(), KEY_LEN);
    }

    #[test]
    fn hex_accepts_0x_prefix() {
        let key = NodeKey::from_hash([7; KEY_LEN]);
        let prefixed = format!("0x{}", key.to_hex());
        assert_eq!(NodeKey::from_hex(&prefixed).unwrap(), key);
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            NodeKey::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
        assert!(matches!(
            NodeKey::from_hex("abcd"),
            Err(TypeError::InvalidLength { actual: 2, .. })
        ));
    }

    #[test]
    fn short_hex_is_8_chars() {
        let key = NodeKey::from_hash([0xab; KEY_LEN]);
        assert_eq!(key.short_hex(), "abababab");
        assert_eq!(format!("{key:?}"), "NodeKey(abababab)");
    }

    #[test]
    fn serde_roundtrip() {
        let key = NodeKey::from_hash([9; KEY_LEN]);
        let json = serde_json::to_string(&key).unwrap();
        let parsed: NodeKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }

    proptest! {
        #[test]
        fn hex_roundtrip(raw in proptest::array::uniform32(any::<u8>())) {
            let key = NodeKey::from_hash(raw);
            prop_assert_eq!(NodeKey::from_hex(&key.to_hex()).unwrap(), key);
        }
    }
}
