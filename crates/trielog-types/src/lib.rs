//! Foundation types for trielog.
//!
//! trielog stores state-trie nodes as immutable, content-addressed blobs on
//! top of an append-only record log. This crate holds the small vocabulary
//! every other crate shares.
//!
//! # Key Types
//!
//! - [`NodeKey`] -- 32-byte content hash identifying a node
//! - [`TVal`] -- a stored value paired with the log offset that holds it
//! - [`Offset`] -- position of a record within a log stream
//! - [`StreamPartition`] -- a (stream, partition) pair as reported by the log

pub mod error;
pub mod key;
pub mod stream;
pub mod value;

pub use error::TypeError;
pub use key::{NodeKey, KEY_LEN};
pub use stream::{Offset, StreamPartition};
pub use value::TVal;
