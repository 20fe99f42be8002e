//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

/// Replica - one-way directory mirror
#[derive(Parser, Debug, Clone)]
#[command(name = "replica")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to mirror from
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// Directory to mirror into (created if missing)
    #[arg(long, visible_alias = "replica", value_name = "PATH")]
    pub backup: PathBuf,

    /// Seconds to sleep between cycles
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Log file, written alongside console output
    #[arg(long, value_name = "PATH")]
    pub logfile: PathBuf,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Exclude pattern in gitignore syntax (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub excludes: Vec<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}
