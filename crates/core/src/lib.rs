//! Replica Core - tree snapshot and content fingerprint primitives
//!
//! This crate provides the read-only half of a mirror cycle:
//! - BLAKE3 content fingerprints
//! - Relative paths and tree snapshots
//! - The tree scanner

pub mod hash;
pub mod tree;

// Re-export main types for convenience
pub use hash::{files_differ, hash_file, Fingerprint};
pub use tree::{scan, RelPath, ScanError, TreeSnapshot};
