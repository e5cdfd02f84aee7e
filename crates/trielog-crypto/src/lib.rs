//! Content hashing for trielog.
//!
//! A node's key is the hash of its bytes. The store hashes on write to derive
//! keys and re-hashes on every index-resolved read to reject candidates whose
//! bytes do not match the requested key.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, NodeHasher};
