//! Tree snapshots and the scanner that produces them
//!
//! A snapshot is the set of relative file paths and relative directory
//! paths found beneath a root at one instant. The root itself is never an
//! entry in `dirs`; both sides of a sync pair are scanned with the same
//! convention so set differences line up.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// A path relative to a tree root, the comparison key between trees
///
/// Only normal components are kept, so two relative paths are equal iff
/// their normalized forms match. Ordering is component-wise, which puts
/// every parent before its children.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelPath(PathBuf);

impl RelPath {
    /// Normalize a relative path, dropping `.` and any root/prefix parts
    ///
    /// Returns `None` for an empty result or when the path climbs out
    /// with `..`.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let mut normalized = PathBuf::new();
        for component in path.as_ref().components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                Component::ParentDir => return None,
            }
        }

        if normalized.as_os_str().is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Get the relative path
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Resolve against a root
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in self.0.components() {
            if !first {
                f.write_str("/")?;
            }
            write!(f, "{}", component.as_os_str().to_string_lossy())?;
            first = false;
        }
        Ok(())
    }
}

/// Files and directories observed under a root at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    /// Every regular file, at any depth
    pub files: BTreeSet<RelPath>,
    /// Every directory below the root, at any depth
    pub dirs: BTreeSet<RelPath>,
    /// Symlinks and special files; never mirrored, recorded so stale ones
    /// can be removed from a replica
    pub others: BTreeSet<RelPath>,
}

impl TreeSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.files.len() + self.dirs.len() + self.others.len()
    }

    /// Check if the snapshot holds no entries
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty() && self.others.is_empty()
    }
}

/// Scanning a root failed; the current cycle cannot proceed
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root path does not exist
    #[error("root {} does not exist", .0.display())]
    RootMissing(PathBuf),

    /// Root path exists but is not a directory
    #[error("root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Root could not be inspected
    #[error("cannot read root {}: {source}", .path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Traversal failed below the root
    #[error("walk failed under {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Scan a root, recording every file and directory beneath it
pub fn scan(root: &Path) -> Result<TreeSnapshot, ScanError> {
    scan_filtered(root, |_, _| true)
}

/// Scan a root, pruning entries for which `keep(path, is_dir)` is false
///
/// A pruned directory is not descended into. Symbolic links are not
/// followed; they land in `others`, never in `files` or `dirs`.
pub fn scan_filtered<F>(root: &Path, keep: F) -> Result<TreeSnapshot, ScanError>
where
    F: Fn(&RelPath, bool) -> bool,
{
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(ScanError::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ScanError::RootMissing(root.to_path_buf()))
        }
        Err(source) => {
            return Err(ScanError::RootUnreadable {
                path: root.to_path_buf(),
                source,
            })
        }
    }

    let mut snapshot = TreeSnapshot::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            match entry.path().strip_prefix(root).ok().and_then(RelPath::new) {
                Some(rel) => keep(&rel, entry.file_type().is_dir()),
                None => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Deleted between readdir and stat; not an error for us
                if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) {
                    tracing::debug!(error = %e, "Entry vanished during scan");
                    continue;
                }
                return Err(ScanError::Walk {
                    root: root.to_path_buf(),
                    source: e,
                });
            }
        };

        let Some(rel) = entry.path().strip_prefix(root).ok().and_then(RelPath::new) else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            snapshot.dirs.insert(rel);
        } else if file_type.is_file() {
            snapshot.files.insert(rel);
        } else {
            snapshot.others.insert(rel);
        }
    }

    Ok(snapshot)
}
