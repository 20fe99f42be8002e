//! Applies classified actions to the replica tree
//!
//! All mutation of the replica happens here. Every action is logged with
//! its kind and relative path. A failing action is logged and counted but
//! never aborts the cycle; the next cycle's fresh diff retries it.

use crate::classify::{Action, ActionSet};
use crate::exclude::ExcludeRules;
use crate::stability::{Stability, StabilityGuard};
use crate::stop::StopSignal;
use filetime::FileTime;
use replica_core::RelPath;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single action failed
#[derive(Debug, Error)]
pub enum ActionError {
    /// The source looks like it is still being written; worth retrying
    #[error("source busy: {reason}")]
    Busy { reason: String },

    /// An excluded replica entry of the other kind occupies the path
    #[error("excluded replica entry {} is in the way", .path.display())]
    Excluded { path: PathBuf },

    /// Anything a retry in the same cycle will not fix
    #[error("{operation} failed for {}: {source}", .path.display())]
    Permanent {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ActionError {
    /// Check if this failure is the transient "partial write" kind
    pub fn is_busy(&self) -> bool {
        matches!(self, ActionError::Busy { .. })
    }

    fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        if is_busy_io(&source) {
            ActionError::Busy {
                reason: format!("{operation} on {}: {source}", path.display()),
            }
        } else {
            ActionError::Permanent {
                operation,
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// OS-level "in use" errors
fn is_busy_io(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::ResourceBusy {
        return true;
    }

    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    #[cfg(windows)]
    {
        if matches!(err.raw_os_error(), Some(32) | Some(33)) {
            return true;
        }
    }

    false
}

/// The path is already absent, possibly because an ancestor is now a file
fn is_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Counts for one applied action set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub dirs_created: usize,
    pub files_created: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
    /// Copies that succeeded only after waiting for the source to settle
    pub files_stabilized: usize,
    /// Copies abandoned because the source never settled
    pub files_skipped: usize,
    /// Actions that failed outright
    pub failures: usize,
    /// The stop signal ended the cycle early
    pub cancelled: bool,
}

impl CycleReport {
    /// Number of successful mutations
    pub fn changes(&self) -> usize {
        self.dirs_created
            + self.files_created
            + self.files_updated
            + self.files_deleted
            + self.dirs_deleted
    }

    /// Every action succeeded and the cycle ran to completion
    pub fn is_clean(&self) -> bool {
        self.files_skipped == 0 && self.failures == 0 && !self.cancelled
    }
}

/// Outcome of a copy after the stability guard had its say
enum CopyOutcome {
    Copied { bytes: u64, waited: bool },
    Skipped,
    Failed(ActionError),
    Cancelled,
}

/// Mutates the replica root to match the source root
#[derive(Debug, Clone)]
pub struct Reconciler {
    source_root: PathBuf,
    replica_root: PathBuf,
    guard: StabilityGuard,
    stop: StopSignal,
    rules: Arc<ExcludeRules>,
}

impl Reconciler {
    pub fn new(
        source_root: impl Into<PathBuf>,
        replica_root: impl Into<PathBuf>,
        guard: StabilityGuard,
        stop: StopSignal,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
            guard,
            stop,
            rules: Arc::new(ExcludeRules::none()),
        }
    }

    /// Protect replica entries matched by `rules` from kind-conflict removal
    pub fn with_exclude_rules(mut self, rules: Arc<ExcludeRules>) -> Self {
        self.rules = rules;
        self
    }

    /// Apply every action in order: create dirs, copy files, delete files,
    /// delete dirs
    ///
    /// The stop signal is checked before each action.
    pub fn apply(&self, actions: &ActionSet) -> CycleReport {
        let mut report = CycleReport::default();

        for action in actions.ordered() {
            if self.stop.is_triggered() {
                info!("Stop requested, ending cycle early");
                report.cancelled = true;
                break;
            }

            match &action {
                Action::CreateDir(rel) => match self.create_dir(rel) {
                    Ok(true) => {
                        report.dirs_created += 1;
                        info!(action = action.kind(), path = %rel, "Directory created");
                    }
                    Ok(false) => info!(action = action.kind(), path = %rel, "Directory already exists"),
                    Err(e) => self.record_failure(&mut report, &action, &e),
                },
                Action::CreateFile(rel) | Action::UpdateFile(rel) => {
                    match self.copy_with_guard(rel) {
                        CopyOutcome::Copied { bytes, waited } => {
                            if matches!(action, Action::CreateFile(_)) {
                                report.files_created += 1;
                                info!(action = action.kind(), path = %rel, bytes, "File created");
                            } else {
                                report.files_updated += 1;
                                info!(action = action.kind(), path = %rel, bytes, "File updated");
                            }
                            if waited {
                                report.files_stabilized += 1;
                            }
                        }
                        CopyOutcome::Skipped => {
                            report.files_skipped += 1;
                            warn!(
                                action = action.kind(),
                                path = %rel,
                                "Source still being written, skipping until next cycle"
                            );
                        }
                        CopyOutcome::Failed(e) => self.record_failure(&mut report, &action, &e),
                        CopyOutcome::Cancelled => {
                            info!(action = action.kind(), path = %rel, "Stop requested while waiting for source");
                            report.cancelled = true;
                            break;
                        }
                    }
                }
                Action::DeleteFile(rel) => match self.delete_file(rel) {
                    Ok(true) => {
                        report.files_deleted += 1;
                        info!(action = action.kind(), path = %rel, "File deleted");
                    }
                    Ok(false) => debug!(action = action.kind(), path = %rel, "Already gone"),
                    Err(e) => self.record_failure(&mut report, &action, &e),
                },
                Action::DeleteDir(rel) => match self.delete_dir(rel) {
                    Ok(true) => {
                        report.dirs_deleted += 1;
                        info!(action = action.kind(), path = %rel, "Directory deleted");
                    }
                    Ok(false) => debug!(action = action.kind(), path = %rel, "Already gone"),
                    Err(e) => self.record_failure(&mut report, &action, &e),
                },
            }
        }

        report
    }

    fn record_failure(&self, report: &mut CycleReport, action: &Action, err: &ActionError) {
        report.failures += 1;
        warn!(action = action.kind(), path = %action.path(), error = %err, "Action failed, will retry next cycle");
    }

    /// Create a directory under the replica root; `Ok(false)` if it existed
    fn create_dir(&self, rel: &RelPath) -> Result<bool, ActionError> {
        let target = rel.under(&self.replica_root);

        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => return Ok(false),
            Ok(_) if self.rules.is_excluded(rel, false) => {
                return Err(ActionError::Excluded { path: target });
            }
            // A file or link sits where the source has a directory
            Ok(_) => {
                fs::remove_file(&target)
                    .map_err(|e| ActionError::io("remove conflicting file", &target, e))?;
            }
            Err(_) => {}
        }

        fs::create_dir_all(&target).map_err(|e| ActionError::io("create directory", &target, e))?;
        Ok(true)
    }

    /// Copy, deferring to the stability guard when the source is busy
    fn copy_with_guard(&self, rel: &RelPath) -> CopyOutcome {
        let quiet_period = self.guard.config().quiet_period();

        let err = match self.copy_file(rel, quiet_period) {
            Ok(bytes) => return CopyOutcome::Copied { bytes, waited: false },
            Err(e) if e.is_busy() => e,
            Err(e) => return CopyOutcome::Failed(e),
        };

        info!(path = %rel, reason = %err, "Source busy, waiting for it to settle");
        match self.guard.wait_until_stable(&rel.under(&self.source_root)) {
            Stability::Stable => match self.copy_file(rel, Duration::ZERO) {
                Ok(bytes) => CopyOutcome::Copied { bytes, waited: true },
                Err(e) if e.is_busy() => {
                    debug!(path = %rel, reason = %e, "Still busy after settling");
                    CopyOutcome::Skipped
                }
                Err(e) => CopyOutcome::Failed(e),
            },
            Stability::Unstable => CopyOutcome::Skipped,
            Stability::Cancelled => CopyOutcome::Cancelled,
        }
    }

    /// Copy one file's bytes, permissions and modification time
    ///
    /// The content is staged in a temporary sibling and renamed over the
    /// target, so a failed copy never leaves a truncated replica file. The
    /// source counts as busy when it was modified less than `min_age` ago
    /// or when its size or mtime moved while we were reading it.
    fn copy_file(&self, rel: &RelPath, min_age: Duration) -> Result<u64, ActionError> {
        let source = rel.under(&self.source_root);
        let target = rel.under(&self.replica_root);

        let before = fs::metadata(&source).map_err(|e| ActionError::io("stat source", &source, e))?;
        if !before.is_file() {
            return Err(ActionError::Permanent {
                operation: "copy",
                path: source,
                source: io::Error::new(io::ErrorKind::InvalidInput, "no longer a regular file"),
            });
        }
        if modified_within(&before, min_age) {
            return Err(ActionError::Busy {
                reason: format!("modified less than {}ms ago", min_age.as_millis()),
            });
        }

        // A directory sits where the source has a file
        if let Ok(meta) = fs::symlink_metadata(&target) {
            if meta.is_dir() {
                if self.rules.is_excluded(rel, true) {
                    return Err(ActionError::Excluded { path: target });
                }
                fs::remove_dir_all(&target)
                    .map_err(|e| ActionError::io("remove conflicting directory", &target, e))?;
            }
        }

        let parent = target.parent().unwrap_or(&self.replica_root);
        let mut staged = tempfile::Builder::new()
            .prefix(".replica-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| ActionError::io("create staging file", parent, e))?;

        let mut reader = File::open(&source).map_err(|e| ActionError::io("open source", &source, e))?;
        let bytes = io::copy(&mut reader, staged.as_file_mut())
            .map_err(|e| ActionError::io("copy", &source, e))?;
        drop(reader);

        let after = fs::metadata(&source).map_err(|e| ActionError::io("stat source", &source, e))?;
        if after.len() != before.len() || after.modified().ok() != before.modified().ok() {
            return Err(ActionError::Busy {
                reason: "changed while being copied".to_string(),
            });
        }

        copy_metadata(&before, staged.path());

        staged
            .persist(&target)
            .map_err(|e| ActionError::io("replace target", &target, e.error))?;
        Ok(bytes)
    }

    /// Remove a replica file; `Ok(false)` if there was nothing to remove
    fn delete_file(&self, rel: &RelPath) -> Result<bool, ActionError> {
        let target = rel.under(&self.replica_root);

        match fs::symlink_metadata(&target) {
            Err(e) if is_gone(&e) => return Ok(false),
            // Replaced by a directory earlier in this cycle
            Ok(meta) if meta.is_dir() => return Ok(false),
            _ => {}
        }

        match fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(e) if is_gone(&e) => Ok(false),
            Err(e) => Err(ActionError::io("remove file", &target, e)),
        }
    }

    /// Remove a replica directory subtree; `Ok(false)` if already gone
    fn delete_dir(&self, rel: &RelPath) -> Result<bool, ActionError> {
        let target = rel.under(&self.replica_root);

        match fs::symlink_metadata(&target) {
            Err(e) if is_gone(&e) => return Ok(false),
            // Replaced by a file earlier in this cycle
            Ok(meta) if !meta.is_dir() => return Ok(false),
            _ => {}
        }

        match fs::remove_dir_all(&target) {
            Ok(()) => Ok(true),
            Err(e) if is_gone(&e) => Ok(false),
            Err(e) => Err(ActionError::io("remove directory", &target, e)),
        }
    }
}

fn modified_within(meta: &Metadata, window: Duration) -> bool {
    if window.is_zero() {
        return false;
    }
    meta.modified()
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .is_some_and(|age| age < window)
}

/// Best-effort: carry mtime and permission bits over to the staged copy
fn copy_metadata(source_meta: &Metadata, staged: &Path) {
    // mtime first: a read-only file may refuse timestamp updates
    let mtime = FileTime::from_last_modification_time(source_meta);
    if let Err(e) = filetime::set_file_mtime(staged, mtime) {
        debug!(path = %staged.display(), error = %e, "Could not set modification time");
    }
    if let Err(e) = fs::set_permissions(staged, source_meta.permissions()) {
        debug!(path = %staged.display(), error = %e, "Could not set permissions");
    }
}
