use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use trielog_crypto::NodeHasher;
use trielog_index::{IndexEntry, OffsetIndex};
use trielog_log::{AppendResult, NodeLog, Record};
use trielog_types::{NodeKey, Offset, StreamPartition, TVal};

use crate::cache::{LruNodeCache, NodeCache};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::report::{BatchOutcome, BatchReport, ReadStats, UpdateReport};
use crate::sizer::BatchSizer;
use crate::verify::HashVerifier;

/// A node returned by the bulk replay read: key, value, log offset.
pub type ReplayedNode = (NodeKey, Bytes, Offset);

/// State guarded by the store lock. The index and the lifecycle flag change
/// together, so they share one lock.
struct Guarded {
    index: Box<dyn OffsetIndex>,
    stopped: bool,
}

/// Content-addressed node store over an append-only log.
///
/// Reads go cache first, then through the index to candidate log offsets,
/// and accept a candidate only if its bytes hash to the requested key.
/// Writes skip nodes that are already stored, split the rest into batches
/// sized for the log, and index every committed batch in one bulk upsert.
///
/// Reads and replay hold the store lock shared; the append and index phase
/// of a write holds it exclusively, so a reader sees either none or all of
/// the nodes one `update` call commits.
pub struct NodeStore {
    config: StoreConfig,
    log: Arc<dyn NodeLog>,
    cache: Arc<dyn NodeCache>,
    verifier: HashVerifier,
    sizer: BatchSizer,
    state: RwLock<Guarded>,
    reads: AtomicU64,
    read_nanos: AtomicU64,
}

impl NodeStore {
    /// Open a store with an LRU cache of `config.cache_capacity` nodes.
    pub fn open(
        config: StoreConfig,
        log: Arc<dyn NodeLog>,
        index: Box<dyn OffsetIndex>,
        hasher: Arc<dyn NodeHasher>,
    ) -> StoreResult<Self> {
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| StoreError::Config("cache_capacity must be at least 1".into()))?;
        Self::with_cache(config, log, index, hasher, Arc::new(LruNodeCache::new(capacity)))
    }

    /// Open a store with a caller-supplied cache.
    pub fn with_cache(
        config: StoreConfig,
        log: Arc<dyn NodeLog>,
        index: Box<dyn OffsetIndex>,
        hasher: Arc<dyn NodeHasher>,
        cache: Arc<dyn NodeCache>,
    ) -> StoreResult<Self> {
        config.validate()?;
        info!(
            stream = %config.stream,
            max_fetch_bytes = config.max_fetch_bytes,
            compression = %config.compression,
            indexed = index.len(),
            "node store opened"
        );
        Ok(Self {
            sizer: BatchSizer::new(config.max_fetch_bytes, config.compression),
            verifier: HashVerifier::new(hasher),
            config,
            log,
            cache,
            state: RwLock::new(Guarded {
                index,
                stopped: false,
            }),
            reads: AtomicU64::new(0),
            read_nanos: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Read path
    // ---------------------------------------------------------------

    /// Look up `key`, returning its value and log offset.
    ///
    /// With `skip_cache` a node found through the index is not added to the
    /// cache. A cache hit is returned either way.
    pub fn get_with_offset(&self, key: &NodeKey, skip_cache: bool) -> StoreResult<Option<TVal>> {
        let started = Instant::now();
        let state = self.state.read();
        if state.stopped {
            return Err(StoreError::Stopped);
        }
        let found = self.resolve(&state, key, skip_cache);
        drop(state);
        self.record_read(started.elapsed());
        found
    }

    /// Look up `key`, returning its value.
    pub fn get(&self, key: &NodeKey) -> StoreResult<Option<Bytes>> {
        Ok(self.get_with_offset(key, false)?.map(|found| found.value))
    }

    fn resolve(&self, state: &Guarded, key: &NodeKey, skip_cache: bool) -> StoreResult<Option<TVal>> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(Some(hit));
        }
        let candidates = state.index.lookup(key.fingerprint(self.config.fingerprint_len))?;
        for candidate in candidates {
            if let Some(found) = self.read_candidate(key, candidate)? {
                if !skip_cache {
                    self.cache.put(*key, found.clone());
                }
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn read_candidate(&self, key: &NodeKey, offset: Offset) -> StoreResult<Option<TVal>> {
        let batches = self
            .log
            .read_from(&self.config.stream, offset, self.config.max_fetch_bytes)?;
        let value = batches
            .into_iter()
            .flat_map(|batch| batch.records)
            .find(|record| record.offset == offset)
            .and_then(|record| record.value);
        let Some(value) = value else {
            debug!(key = %key.short_hex(), offset, "no value at candidate offset");
            return Ok(None);
        };
        if !self.verifier.matches(key, &value) {
            debug!(key = %key.short_hex(), offset, "candidate failed hash verification");
            return Ok(None);
        }
        Ok(Some(TVal::new(value, offset)))
    }

    fn record_read(&self, elapsed: Duration) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.read_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    // ---------------------------------------------------------------
    // Write path
    // ---------------------------------------------------------------

    /// Store every node in `to_upsert` that is not already present.
    ///
    /// `to_remove` is accepted for interface compatibility and ignored: the
    /// log is append-only and nodes are never deleted by this layer.
    ///
    /// A batch the log fails to append is reported in the returned
    /// [`UpdateReport`] and its nodes are neither indexed nor cached; the
    /// remaining batches still proceed. An index failure is returned as an
    /// error.
    ///
    /// # Panics
    ///
    /// Panics if the log reports a last offset that disagrees with the
    /// number of records it was given.
    pub fn update(&self, to_remove: &[NodeKey], to_upsert: &[(NodeKey, Bytes)]) -> StoreResult<UpdateReport> {
        let mut report = UpdateReport {
            removals_ignored: to_remove.len(),
            ..UpdateReport::default()
        };
        if !to_remove.is_empty() {
            warn!(
                count = to_remove.len(),
                "node removal is not supported by the append-only store; ignoring"
            );
        }
        if self.state.read().stopped {
            return Err(StoreError::Stopped);
        }

        // Runs under the shared lock only. A concurrent writer may store the
        // same node before we take the exclusive lock; the node is then
        // appended twice, which readers cannot observe.
        let mut seen = HashSet::with_capacity(to_upsert.len());
        let mut pending = Vec::with_capacity(to_upsert.len());
        for (key, value) in to_upsert {
            if !seen.insert(*key) {
                continue;
            }
            if self.get_with_offset(key, false)?.is_some() {
                report.already_present += 1;
                continue;
            }
            pending.push((*key, value.clone()));
        }
        if pending.is_empty() {
            debug!(already_present = report.already_present, "update has nothing to write");
            return Ok(report);
        }

        let batches = self.sizer.partition(&pending);
        let partition = StreamPartition::primary(self.config.stream.as_str());
        let fingerprint_len = self.config.fingerprint_len;

        let mut state = self.state.write();
        if state.stopped {
            return Err(StoreError::Stopped);
        }

        let mut entries = Vec::with_capacity(pending.len());
        let mut fills = Vec::with_capacity(pending.len());
        for batch in batches {
            let size = BatchSizer::batch_size(batch);
            let outcome = match self.append_batch(&partition, batch) {
                Ok((first_offset, last_offset)) => {
                    let mut assigned = first_offset;
                    for (i, (key, value)) in batch.iter().enumerate() {
                        assigned = first_offset + i as Offset;
                        entries.push(IndexEntry::for_key(key, fingerprint_len, assigned));
                        fills.push((*key, TVal::new(value.clone(), assigned)));
                    }
                    assert_eq!(
                        assigned,
                        last_offset,
                        "log reported last offset {last_offset} for {} records starting at {first_offset}",
                        batch.len()
                    );
                    debug!(
                        stream = %partition,
                        first_offset,
                        records = batch.len(),
                        size,
                        "batch committed"
                    );
                    BatchOutcome::Committed {
                        first_offset,
                        last_offset,
                    }
                }
                Err(error) => {
                    error!(
                        stream = %partition,
                        records = batch.len(),
                        size,
                        %error,
                        "batch append failed; its nodes are not indexed"
                    );
                    BatchOutcome::Failed { error }
                }
            };
            report.batches.push(BatchReport {
                records: batch.len(),
                size,
                outcome,
            });
        }

        if !entries.is_empty() {
            state.index.bulk_upsert(&entries)?;
        }
        for (key, found) in fills {
            self.cache.put(key, found);
        }
        report.index_entries_written = entries.len();
        Ok(report)
    }

    /// Append one batch; returns its offset range or the reason it failed.
    fn append_batch(&self, partition: &StreamPartition, batch: &[(NodeKey, Bytes)]) -> Result<(Offset, Offset), String> {
        let records: Vec<Record> = batch
            .iter()
            .map(|(key, value)| Record::new(Bytes::copy_from_slice(key.as_bytes()), value.clone()))
            .collect();
        match self.log.append(&partition.stream, &records, self.config.compression) {
            Ok(mut results) => match results.remove(partition) {
                Some(AppendResult::Appended {
                    first_offset,
                    last_offset,
                    ..
                }) => Ok((first_offset, last_offset)),
                Some(AppendResult::Failed { error }) => Err(error),
                None => Err(format!("log returned no result for {partition}")),
            },
            Err(e) => Err(e.to_string()),
        }
    }

    // ---------------------------------------------------------------
    // Bulk replay
    // ---------------------------------------------------------------

    /// Nodes of this store's stream at or after `from_offset`, plus the
    /// offset to continue from.
    pub fn read_batch(&self, from_offset: Offset, max_bytes: usize) -> StoreResult<(Offset, Vec<ReplayedNode>)> {
        self.read_stream_batch(&self.config.stream, from_offset, max_bytes)
    }

    /// Like [`NodeStore::read_batch`] for any stream of the shared log.
    /// Records without a 32-byte key or without a value are skipped.
    pub fn read_stream_batch(
        &self,
        stream: &str,
        from_offset: Offset,
        max_bytes: usize,
    ) -> StoreResult<(Offset, Vec<ReplayedNode>)> {
        let chunk = {
            let state = self.state.read();
            if state.stopped {
                return Err(StoreError::Stopped);
            }
            self.log.read_range(stream, from_offset, max_bytes)?
        };

        let mut nodes = Vec::with_capacity(chunk.records.len());
        for record in chunk.records {
            let key = record.key.as_deref().and_then(|k| NodeKey::from_slice(k).ok());
            match (key, record.value) {
                (Some(key), Some(value)) => nodes.push((key, value, record.offset)),
                _ => warn!(stream, offset = record.offset, "skipping record that is not a node"),
            }
        }
        Ok((chunk.next_offset, nodes))
    }

    // ---------------------------------------------------------------
    // Lifecycle and instrumentation
    // ---------------------------------------------------------------

    /// Number of records in this store's stream, including any nodes that
    /// were appended more than once.
    pub fn count(&self) -> StoreResult<u64> {
        let state = self.state.read();
        if state.stopped {
            return Err(StoreError::Stopped);
        }
        Ok(self.log.end_offset(&self.config.stream)?)
    }

    /// Number of `(fingerprint, offset)` pairs in the index.
    pub fn index_len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }

    pub fn cache_read_count(&self) -> u64 {
        self.cache.read_count()
    }

    pub fn reset_cache_hit_rate(&self) {
        self.cache.reset_hit_rate();
    }

    pub fn read_stats(&self) -> ReadStats {
        ReadStats {
            reads: self.reads.load(Ordering::Relaxed),
            total_nanos: self.read_nanos.load(Ordering::Relaxed),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.read().stopped
    }

    /// Close the index. Later reads and writes fail with
    /// [`StoreError::Stopped`]; stopping twice is a no-op.
    pub fn stop(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.stopped {
            return Ok(());
        }
        state.stopped = true;
        let closed = state.index.close();
        info!(stream = %self.config.stream, indexed = state.index.len(), "node store stopped");
        Ok(closed?)
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("stream", &self.config.stream)
            .field("cache_len", &self.cache.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
