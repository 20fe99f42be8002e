//! Change classification between a source and a replica snapshot

use rayon::prelude::*;
use replica_core::{RelPath, TreeSnapshot};
use std::collections::BTreeSet;
use std::fmt;

/// One filesystem mutation against the replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create a directory (and missing parents)
    CreateDir(RelPath),
    /// Copy a file that is missing from the replica
    CreateFile(RelPath),
    /// Overwrite a replica file whose content differs
    UpdateFile(RelPath),
    /// Remove a file or link absent from the source
    DeleteFile(RelPath),
    /// Remove a directory subtree absent from the source
    DeleteDir(RelPath),
}

impl Action {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Action::CreateDir(_) => "create_dir",
            Action::CreateFile(_) => "create_file",
            Action::UpdateFile(_) => "update_file",
            Action::DeleteFile(_) => "delete_file",
            Action::DeleteDir(_) => "delete_dir",
        }
    }

    /// Path the action applies to
    pub fn path(&self) -> &RelPath {
        match self {
            Action::CreateDir(p)
            | Action::CreateFile(p)
            | Action::UpdateFile(p)
            | Action::DeleteFile(p)
            | Action::DeleteDir(p) => p,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}

/// Classified differences for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet {
    pub dirs_to_create: BTreeSet<RelPath>,
    pub dirs_to_delete: BTreeSet<RelPath>,
    pub files_to_create: BTreeSet<RelPath>,
    pub files_to_update: BTreeSet<RelPath>,
    pub files_to_delete: BTreeSet<RelPath>,
}

impl ActionSet {
    /// Check if there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of actions
    pub fn len(&self) -> usize {
        self.dirs_to_create.len()
            + self.dirs_to_delete.len()
            + self.files_to_create.len()
            + self.files_to_update.len()
            + self.files_to_delete.len()
    }

    /// Actions in the order they must be applied
    ///
    /// Directory creation (parents first), then file copies, then file
    /// deletions, then directory deletions (children first).
    pub fn ordered(&self) -> impl Iterator<Item = Action> + '_ {
        self.dirs_to_create
            .iter()
            .cloned()
            .map(Action::CreateDir)
            .chain(self.files_to_create.iter().cloned().map(Action::CreateFile))
            .chain(self.files_to_update.iter().cloned().map(Action::UpdateFile))
            .chain(self.files_to_delete.iter().cloned().map(Action::DeleteFile))
            .chain(self.dirs_to_delete.iter().rev().cloned().map(Action::DeleteDir))
    }
}

/// Partition the paths of two snapshots into actions
///
/// `is_changed` is only called for files present on both sides, and may be
/// called from several threads at once. Same inputs give the same result.
pub fn classify<F>(source: &TreeSnapshot, replica: &TreeSnapshot, is_changed: F) -> ActionSet
where
    F: Fn(&RelPath) -> bool + Sync,
{
    let common: Vec<&RelPath> = source.files.intersection(&replica.files).collect();

    let files_to_update: BTreeSet<RelPath> = common
        .into_par_iter()
        .filter(|path| is_changed(path))
        .cloned()
        .collect();

    ActionSet {
        dirs_to_create: source.dirs.difference(&replica.dirs).cloned().collect(),
        dirs_to_delete: replica.dirs.difference(&source.dirs).cloned().collect(),
        files_to_create: source.files.difference(&replica.files).cloned().collect(),
        files_to_update,
        files_to_delete: replica
            .files
            .difference(&source.files)
            .chain(stale_others(source, replica))
            .cloned()
            .collect(),
    }
}

/// Replica links and special files not shadowed by a source file or dir
///
/// Those are never mirrored. Where the source has a real entry, the create
/// action already replaces the link.
fn stale_others<'a>(
    source: &'a TreeSnapshot,
    replica: &'a TreeSnapshot,
) -> impl Iterator<Item = &'a RelPath> + 'a {
    replica
        .others
        .iter()
        .filter(|path| !source.files.contains(*path) && !source.dirs.contains(*path))
}
