//! Replica CLI - one-way directory mirror

use anyhow::{Context, Result};
use clap::Parser;
use cli_lib::shutdown::ShutdownSignals;
use cli_lib::{config, logging, roots, Cli, ReplicaConfig};
use engine::{stop, Scheduler, SyncPair};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(&cli.logfile)?;

    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "Exiting with error");
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => ReplicaConfig::default(),
    };

    let (source, replica) =
        roots::prepare(&cli.source, &cli.backup).context("Invalid source or replica directory")?;

    let options = config.sync_options(&cli.excludes);
    let pair = SyncPair::new(source, replica, options);
    let scheduler = Scheduler::new(pair, Duration::from_secs(cli.interval));

    let (handle, signal) = stop::channel();
    let listener = ShutdownSignals::install()?.forward_to(handle);

    if cli.once {
        let report = scheduler.run_once(&signal).await?;
        info!(
            changes = report.changes(),
            stabilized = report.files_stabilized,
            skipped = report.files_skipped,
            failures = report.failures,
            "Single cycle complete"
        );
    } else {
        scheduler.run(signal).await?;
    }

    listener.abort();
    Ok(())
}
