//! Common utilities for engine integration tests

pub mod fixtures;

pub use fixtures::{assert_mirrored, fast_options, TreeSize, TreeTemplate, TestPair};
