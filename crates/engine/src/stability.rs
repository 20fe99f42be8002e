//! Stability guard for source files that may still be written
//!
//! A file counts as stable once its size has not changed across samples
//! spanning `quiet_period`. Sizes are sampled every `poll_interval`; any
//! change resets the accumulated quiet time to zero.
//!
//! This is a heuristic. A producer that rewrites bytes in place without
//! changing the length looks stable to this check.

use crate::stop::StopSignal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Stability guard timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StabilityConfig {
    /// Size sampling cadence in milliseconds (default: 250)
    pub poll_interval_ms: u64,

    /// Required quiet time in milliseconds (default: 1000)
    pub quiet_period_ms: u64,

    /// Upper bound on one wait in seconds (default: 30)
    pub max_wait_secs: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            quiet_period_ms: 1000,
            max_wait_secs: 30,
        }
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Result of waiting for a file to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Size held steady for the quiet period
    Stable,
    /// Still changing at the deadline, or the file disappeared
    Unstable,
    /// Stop requested while waiting
    Cancelled,
}

/// Waits for files to stop growing before they are copied
#[derive(Debug, Clone)]
pub struct StabilityGuard {
    config: StabilityConfig,
    stop: StopSignal,
}

impl StabilityGuard {
    pub fn new(config: StabilityConfig, stop: StopSignal) -> Self {
        Self { config, stop }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Sample `path` until it is stable, the wait times out, or a stop arrives
    pub fn wait_until_stable(&self, path: &Path) -> Stability {
        let poll = self.config.poll_interval();
        let quiet_period = self.config.quiet_period();
        let deadline = Instant::now() + self.config.max_wait();

        let Some(mut last_size) = file_size(path) else {
            return Stability::Unstable;
        };
        let mut quiet = Duration::ZERO;

        while quiet < quiet_period {
            if Instant::now() + poll > deadline {
                tracing::debug!(path = %path.display(), "Stability wait timed out");
                return Stability::Unstable;
            }
            if !self.stop.sleep(poll) {
                return Stability::Cancelled;
            }

            let Some(size) = file_size(path) else {
                return Stability::Unstable;
            };

            if size == last_size {
                quiet += poll;
            } else {
                tracing::debug!(path = %path.display(), from = last_size, to = size, "Size changed, resetting quiet time");
                quiet = Duration::ZERO;
                last_size = size;
            }
        }

        Stability::Stable
    }
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}
