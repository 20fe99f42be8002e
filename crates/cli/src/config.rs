//! Configuration file for Replica
//!
//! An optional TOML file passed with `--config`. Every field has a default,
//! so an empty file is valid:
//!
//! ```toml
//! [stability]
//! poll_interval_ms = 250
//! quiet_period_ms = 1000
//! max_wait_secs = 30
//!
//! [filter]
//! use_ignore_file = true
//! exclude = ["*.tmp", "target/"]
//! ```

use anyhow::{ensure, Context, Result};
use engine::{ExcludeConfig, StabilityConfig, SyncOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

const POLL_INTERVAL_MS: RangeInclusive<u64> = 10..=60_000;
const QUIET_PERIOD_MS: RangeInclusive<u64> = 0..=600_000;
const MAX_WAIT_SECS: RangeInclusive<u64> = 1..=86_400;

/// Replica configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicaConfig {
    /// Stability guard timing
    pub stability: StabilityConfig,

    /// Exclude rules
    pub filter: FilterConfig,
}

/// Exclude configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Read `.replicaignore` from the source root (default: true)
    pub use_ignore_file: bool,

    /// Gitignore-syntax patterns (default: none)
    pub exclude: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            use_ignore_file: true,
            exclude: Vec::new(),
        }
    }
}

impl ReplicaConfig {
    /// Check every value is within its allowed range
    pub fn validate(&self) -> Result<()> {
        let s = &self.stability;
        ensure!(
            POLL_INTERVAL_MS.contains(&s.poll_interval_ms),
            "stability.poll_interval_ms must be between {} and {} (got {})",
            POLL_INTERVAL_MS.start(),
            POLL_INTERVAL_MS.end(),
            s.poll_interval_ms
        );
        ensure!(
            QUIET_PERIOD_MS.contains(&s.quiet_period_ms),
            "stability.quiet_period_ms must be between {} and {} (got {})",
            QUIET_PERIOD_MS.start(),
            QUIET_PERIOD_MS.end(),
            s.quiet_period_ms
        );
        ensure!(
            MAX_WAIT_SECS.contains(&s.max_wait_secs),
            "stability.max_wait_secs must be between {} and {} (got {})",
            MAX_WAIT_SECS.start(),
            MAX_WAIT_SECS.end(),
            s.max_wait_secs
        );
        for pattern in &self.filter.exclude {
            ensure!(!pattern.trim().is_empty(), "filter.exclude contains an empty pattern");
        }
        Ok(())
    }

    /// Build engine options, appending command-line excludes after the file's
    pub fn sync_options(&self, extra_excludes: &[String]) -> SyncOptions {
        let mut patterns = self.filter.exclude.clone();
        patterns.extend(extra_excludes.iter().cloned());

        SyncOptions {
            stability: self.stability,
            exclude: ExcludeConfig {
                use_ignore_file: self.filter.use_ignore_file,
                patterns,
            },
        }
    }
}

/// Load and validate a configuration file
pub fn load(path: &Path) -> Result<ReplicaConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;

    let config: ReplicaConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid config at {}", path.display()))?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}
