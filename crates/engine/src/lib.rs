//! Mirror engine for Replica
//!
//! This crate turns two directory trees into one-way mirror cycles:
//! - Change classification between source and replica snapshots
//! - Ordered, failure-tolerant application of the resulting actions
//! - A stability guard for source files that are still being written
//! - A cancellable scheduler that repeats the cycle on an interval

pub mod classify;
pub mod exclude;
pub mod reconcile;
pub mod scheduler;
pub mod stability;
pub mod stop;

pub use classify::{classify, Action, ActionSet};
pub use exclude::{ExcludeConfig, ExcludeRules};
pub use reconcile::{ActionError, CycleReport, Reconciler};
pub use scheduler::Scheduler;
pub use stability::{Stability, StabilityConfig, StabilityGuard};
pub use stop::{StopHandle, StopSignal};

use replica_core::{files_differ, tree, ScanError, TreeSnapshot};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Tunables for a sync pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub stability: StabilityConfig,
    pub exclude: ExcludeConfig,
}

/// A cycle could not run at all; nothing was applied
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("source scan failed: {0}")]
    SourceScan(#[source] ScanError),

    #[error("replica scan failed: {0}")]
    ReplicaScan(#[source] ScanError),

    #[error("cannot create replica root {}: {source}", .path.display())]
    ReplicaRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid exclude rules: {0}")]
    Exclude(String),
}

/// A source root mirrored into a replica root
#[derive(Debug, Clone)]
pub struct SyncPair {
    source: PathBuf,
    replica: PathBuf,
    options: SyncOptions,
}

impl SyncPair {
    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>, options: SyncOptions) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            options,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn replica(&self) -> &Path {
        &self.replica
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Scan both roots with the current exclude rules
    ///
    /// The replica root is created first if it went missing.
    pub fn snapshots(&self) -> Result<(TreeSnapshot, TreeSnapshot), CycleError> {
        self.scan_with(&self.exclude_rules()?)
    }

    /// Scan and classify without touching the replica
    pub fn plan(&self) -> Result<ActionSet, CycleError> {
        let (source, replica) = self.snapshots()?;
        Ok(self.classify_snapshots(&source, &replica))
    }

    /// Rules are reloaded every cycle so ignore-file edits take effect
    fn exclude_rules(&self) -> Result<ExcludeRules, CycleError> {
        ExcludeRules::load(&self.source, &self.options.exclude)
            .map_err(|e| CycleError::Exclude(format!("{e:#}")))
    }

    fn scan_with(&self, rules: &ExcludeRules) -> Result<(TreeSnapshot, TreeSnapshot), CycleError> {
        let keep = |rel: &replica_core::RelPath, is_dir: bool| !rules.is_excluded(rel, is_dir);
        let source = tree::scan_filtered(&self.source, keep).map_err(CycleError::SourceScan)?;

        if !self.replica.exists() {
            tracing::info!(path = %self.replica.display(), "Replica root missing, creating it");
            fs::create_dir_all(&self.replica).map_err(|source| CycleError::ReplicaRoot {
                path: self.replica.clone(),
                source,
            })?;
        }
        let replica = tree::scan_filtered(&self.replica, keep).map_err(CycleError::ReplicaScan)?;

        Ok((source, replica))
    }

    fn classify_snapshots(&self, source: &TreeSnapshot, replica: &TreeSnapshot) -> ActionSet {
        classify(source, replica, |rel| {
            files_differ(&rel.under(&self.source), &rel.under(&self.replica))
        })
    }

    /// One full scan-classify-apply pass
    pub fn run_cycle(&self, stop: &StopSignal) -> Result<CycleReport, CycleError> {
        let rules = self.exclude_rules()?;
        let (source, replica) = self.scan_with(&rules)?;
        let actions = self.classify_snapshots(&source, &replica);
        if actions.is_empty() {
            tracing::debug!("Replica already up to date");
            return Ok(CycleReport::default());
        }

        tracing::debug!(actions = actions.len(), "Applying actions");
        let guard = StabilityGuard::new(self.options.stability, stop.clone());
        let reconciler = Reconciler::new(&self.source, &self.replica, guard, stop.clone())
            .with_exclude_rules(Arc::new(rules));
        Ok(reconciler.apply(&actions))
    }
}
