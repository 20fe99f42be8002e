//! Replica CLI library
//!
//! Argument parsing, configuration, logging setup and startup checks for the
//! `replica` binary.

pub mod args;
pub mod config;
pub mod logging;
pub mod roots;
pub mod shutdown;

pub use args::Cli;
pub use config::ReplicaConfig;
