//! Periodic mirror scheduler
//!
//! Runs one full cycle, then sleeps for the interval, until stopped. The
//! interval is a floor on the spacing between cycles; a slow cycle just
//! delays the next one. Cycles never overlap.

use crate::reconcile::CycleReport;
use crate::stop::StopSignal;
use crate::SyncPair;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Repeats mirror cycles for one sync pair
pub struct Scheduler {
    /// Source and replica roots
    pair: Arc<SyncPair>,

    /// Sleep between the end of one cycle and the start of the next
    interval: Duration,
}

impl Scheduler {
    /// Create new scheduler
    pub fn new(pair: SyncPair, interval: Duration) -> Self {
        Self {
            pair: Arc::new(pair),
            interval,
        }
    }

    /// Run cycles until `stop` fires
    ///
    /// A cycle that cannot scan is logged and skipped; the loop carries on.
    /// Returns the number of cycles started.
    pub async fn run(self, stop: StopSignal) -> Result<u64> {
        info!(
            source = %self.pair.source().display(),
            replica = %self.pair.replica().display(),
            "Starting mirror (interval: {:?})",
            self.interval
        );

        let mut cycles = 0u64;

        loop {
            if stop.is_triggered() {
                break;
            }

            cycles += 1;
            info!(cycle = cycles, "Cycle started");

            match self.run_once(&stop).await {
                Ok(report) if report.cancelled => {
                    info!(cycle = cycles, changes = report.changes(), "Cycle interrupted");
                    break;
                }
                Ok(report) => log_cycle_complete(cycles, &report),
                Err(e) => {
                    warn!(cycle = cycles, error = %format!("{e:#}"), "Cycle skipped, retrying next interval");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.triggered() => break,
            }
        }

        info!(cycles, "Mirror terminated");
        Ok(cycles)
    }

    /// Run exactly one cycle on the blocking pool
    pub async fn run_once(&self, stop: &StopSignal) -> Result<CycleReport> {
        let pair = Arc::clone(&self.pair);
        let stop = stop.clone();

        let report = tokio::task::spawn_blocking(move || pair.run_cycle(&stop))
            .await
            .context("Mirror cycle task failed")??;
        Ok(report)
    }
}

fn log_cycle_complete(cycle: u64, report: &CycleReport) {
    info!(
        cycle,
        dirs_created = report.dirs_created,
        files_created = report.files_created,
        files_updated = report.files_updated,
        files_deleted = report.files_deleted,
        dirs_deleted = report.dirs_deleted,
        stabilized = report.files_stabilized,
        skipped = report.files_skipped,
        failures = report.failures,
        "Cycle complete"
    );
}
