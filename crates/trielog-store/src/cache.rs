use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use trielog_types::{NodeKey, TVal};

/// Bounded key to value cache in front of the log.
///
/// The cache is an optimization only: it may drop any entry at any time and
/// the store stays correct. It must tolerate concurrent `get`/`put` from many
/// readers.
pub trait NodeCache: Send + Sync {
    fn get(&self, key: &NodeKey) -> Option<TVal>;

    fn put(&self, key: NodeKey, value: TVal);

    /// Fraction of `get` calls since the last reset that found an entry.
    fn hit_rate(&self) -> f64;

    /// Number of `get` calls since the last reset.
    fn read_count(&self) -> u64;

    /// Zero the hit and read counters.
    fn reset_hit_rate(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

/// Least-recently-used [`NodeCache`].
pub struct LruNodeCache {
    entries: Mutex<LruCache<NodeKey, TVal>>,
    hits: AtomicU64,
    reads: AtomicU64,
}

impl LruNodeCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl NodeCache for LruNodeCache {
    fn get(&self, key: &NodeKey) -> Option<TVal> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let found = self.entries.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn put(&self, key: NodeKey, value: TVal) {
        self.entries.lock().put(key, value);
    }

    fn hit_rate(&self) -> f64 {
        let reads = self.reads.load(Ordering::Relaxed);
        if reads == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / reads as f64
    }

    fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn reset_hit_rate(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl std::fmt::Debug for LruNodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("LruNodeCache")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .field("reads", &self.reads.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u8) -> NodeKey {
        NodeKey::from_hash([i; 32])
    }

    fn cache(capacity: usize) -> LruNodeCache {
        LruNodeCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn hit_rate_counts_gets() {
        let c = cache(4);
        assert_eq!(c.hit_rate(), 0.0);
        c.put(key(1), TVal::new(vec![1], 0));
        assert!(c.get(&key(1)).is_some());
        assert!(c.get(&key(2)).is_none());
        assert_eq!(c.read_count(), 2);
        assert!((c.hit_rate() - 0.5).abs() < f64::EPSILON);

        c.reset_hit_rate();
        assert_eq!(c.read_count(), 0);
        assert_eq!(c.hit_rate(), 0.0);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let c = cache(2);
        c.put(key(1), TVal::new(vec![1], 0));
        c.put(key(2), TVal::new(vec![2], 1));
        c.get(&key(1));
        c.put(key(3), TVal::new(vec![3], 2));
        assert!(c.get(&key(2)).is_none());
        assert!(c.get(&key(1)).is_some());
        assert!(c.get(&key(3)).is_some());
        assert_eq!(c.capacity(), 2);
    }

    #[test]
    fn clear_empties() {
        let c = cache(2);
        c.put(key(1), TVal::new(vec![1], 0));
        c.clear();
        assert!(c.is_empty());
    }
}
