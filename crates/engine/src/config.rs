//! Store configuration via `tally.toml`
//!
//! On first open of a data directory, a default `tally.toml` is created.
//! To change settings, edit the file and reopen the store.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_concurrency::SnapshotConfig;
use tally_core::{Error, Result};

/// Config file name placed in the store data directory.
pub const CONFIG_FILE_NAME: &str = "tally.toml";

/// Store configuration loaded from `tally.toml`.
///
/// # Example
///
/// ```toml
/// snapshot_poll_interval_ms = 1
/// # snapshot_max_wait_ms = 30000
/// initial_capacity = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Poll interval while a snapshot waits for the commit watermark.
    #[serde(default = "default_poll_interval_ms")]
    pub snapshot_poll_interval_ms: u64,
    /// Upper bound on a snapshot wait. Absent means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_max_wait_ms: Option<u64>,
    /// Expected number of distinct statistic keys.
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    1
}

fn default_initial_capacity() -> usize {
    1024
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            snapshot_poll_interval_ms: default_poll_interval_ms(),
            snapshot_max_wait_ms: None,
            initial_capacity: default_initial_capacity(),
        }
    }
}

impl TallyConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tally counts store configuration
#
# Poll interval while a snapshot waits for the commit watermark (ms)
snapshot_poll_interval_ms = 1

# Optional upper bound on a snapshot wait (ms). Absent = wait forever.
# snapshot_max_wait_ms = 30000

# Expected number of distinct statistic keys (map pre-sizing)
initial_capacity = 1024
"#
    }

    /// Reject values the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_poll_interval_ms == 0 {
            return Err(Error::Config(
                "snapshot_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.snapshot_max_wait_ms == Some(0) {
            return Err(Error::Config(
                "snapshot_max_wait_ms must be at least 1 (omit it to wait forever)".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot wait tuning derived from this config.
    pub fn snapshot_config(&self) -> SnapshotConfig {
        let config = SnapshotConfig::new()
            .with_poll_interval(Duration::from_millis(self.snapshot_poll_interval_ms));
        match self.snapshot_max_wait_ms {
            Some(ms) => config.with_max_wait(Duration::from_millis(ms)),
            None => config,
        }
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: TallyConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
