//! Content-addressed node store for trielog.
//!
//! Trie nodes are stored by the hash of their bytes on top of an append-only
//! record log. A secondary index maps a short key fingerprint to the log
//! offsets that may hold a node, and a bounded cache sits in front of both.
//!
//! # Components
//!
//! - [`NodeStore`] -- read path, write path, replay, lifecycle
//! - [`BatchSizer`] -- splits writes into batches sized like the log sizes them
//! - [`HashVerifier`] -- accepts a candidate only if it hashes to the key
//! - [`NodeCache`] / [`LruNodeCache`] -- bounded read cache
//! - [`StoreConfig`] -- per-store settings, loadable from TOML
//!
//! # Design Rules
//!
//! 1. Nodes are immutable once appended; this layer never deletes them.
//! 2. A node read through the index is always hash-verified.
//! 3. The index covers every node of a batch before `update` reports the
//!    batch as committed.
//! 4. The cache is only an optimization; an empty cache never changes a result.
//! 5. A failed batch append is reported, never silently dropped.

pub mod cache;
pub mod config;
pub mod error;
pub mod report;
pub mod sizer;
pub mod store;
pub mod verify;

pub use cache::{LruNodeCache, NodeCache};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use report::{BatchOutcome, BatchReport, ReadStats, UpdateReport};
pub use sizer::BatchSizer;
pub use store::{NodeStore, ReplayedNode};
pub use verify::HashVerifier;
