//! Secondary index for trielog.
//!
//! Maps a short key fingerprint to every log offset stored under it. A
//! fingerprint is only a prefix of the full key, so one fingerprint may name
//! several offsets; callers read each candidate and check it.
//!
//! # Key Types
//!
//! - [`OffsetIndex`] -- the interface the node store depends on
//! - [`IndexEntry`] -- one `(fingerprint, offset)` pair
//! - [`MemoryIndex`] -- plain in-memory map
//! - [`FileIndex`] -- in-memory map rebuilt from an append-only journal

pub mod config;
pub mod entry;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use config::IndexConfig;
pub use entry::IndexEntry;
pub use error::{IndexError, IndexResult};
pub use file::FileIndex;
pub use memory::MemoryIndex;
pub use traits::OffsetIndex;
