//! Exclude rules for paths that are neither mirrored nor pruned
//!
//! Two sources of patterns, both in gitignore syntax:
//! 1. Patterns from configuration and the command line
//! 2. A `.replicaignore` file at the source root (optional, enabled by default)
//!
//! Excluded paths are filtered out of both the source and the replica scan,
//! so a matching path in the replica is left alone rather than deleted.

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use replica_core::RelPath;
use std::path::Path;

/// Name of the per-tree ignore file looked up at the source root
pub const IGNORE_FILE_NAME: &str = ".replicaignore";

/// Compiled exclude rules for one cycle
#[derive(Debug)]
pub struct ExcludeRules {
    /// Patterns from configuration (optional)
    configured: Option<Gitignore>,

    /// Patterns from the source root's ignore file (optional)
    ignore_file: Option<Gitignore>,
}

impl ExcludeRules {
    /// Rules that exclude nothing
    pub fn none() -> Self {
        Self {
            configured: None,
            ignore_file: None,
        }
    }

    /// Compile rules for a source root
    pub fn load(source_root: &Path, config: &ExcludeConfig) -> Result<Self> {
        let configured = if config.patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(source_root);
            for pattern in &config.patterns {
                builder
                    .add_line(None, pattern)
                    .with_context(|| format!("Invalid exclude pattern: {}", pattern))?;
            }
            Some(builder.build()?)
        };

        let ignore_file = if config.use_ignore_file {
            let path = source_root.join(IGNORE_FILE_NAME);
            if path.is_file() {
                let mut builder = GitignoreBuilder::new(source_root);
                if let Some(e) = builder.add(&path) {
                    return Err(e).with_context(|| format!("Failed to parse {}", path.display()));
                }
                Some(builder.build()?)
            } else {
                None
            }
        } else {
            None
        };

        Ok(Self {
            configured,
            ignore_file,
        })
    }

    /// Check if a relative path is excluded
    pub fn is_excluded(&self, path: &RelPath, is_dir: bool) -> bool {
        [&self.configured, &self.ignore_file]
            .into_iter()
            .flatten()
            .any(|rules| {
                rules
                    .matched_path_or_any_parents(path.as_path(), is_dir)
                    .is_ignore()
            })
    }
}

/// Exclude configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeConfig {
    /// Read `.replicaignore` from the source root (default: true)
    pub use_ignore_file: bool,

    /// Additional gitignore-syntax patterns
    pub patterns: Vec<String>,
}

impl Default for ExcludeConfig {
    fn default() -> Self {
        Self {
            use_ignore_file: true,
            patterns: vec![],
        }
    }
}
