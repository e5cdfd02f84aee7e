use std::sync::Arc;

use trielog_crypto::NodeHasher;
use trielog_types::NodeKey;

/// Checks that bytes read back from the log are the node a key names.
///
/// Index lookups go by fingerprint, which is only a key prefix, so a
/// candidate offset may hold a different node. Recomputing the content hash
/// is the only thing that tells them apart.
#[derive(Clone)]
pub struct HashVerifier {
    hasher: Arc<dyn NodeHasher>,
}

impl HashVerifier {
    pub fn new(hasher: Arc<dyn NodeHasher>) -> Self {
        Self { hasher }
    }

    pub fn matches(&self, key: &NodeKey, value: &[u8]) -> bool {
        self.hasher.verify(value, key)
    }

    /// Key for `value` under this verifier's hash function.
    pub fn key_for(&self, value: &[u8]) -> NodeKey {
        self.hasher.hash(value)
    }
}

impl std::fmt::Debug for HashVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashVerifier").finish_non_exhaustive()
    }
}
