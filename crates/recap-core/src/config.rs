//! Recording configuration
//!
//! A small layered configuration: defaults, optionally a TOML file, then
//! environment overrides. The only knob most deployments touch is the
//! snapshot directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RecapError, RecapResult};

/// Environment variable overriding the snapshot directory
pub const SNAPSHOT_DIR_ENV: &str = "RECAP_SNAPSHOT_DIR";

/// Configuration for the snapshot recorder and writer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Directory snapshot files are written into
    pub snapshot_dir: PathBuf,
    /// Pretty-print snapshot JSON
    pub pretty_print: bool,
    /// Open group/other read access on written files and directories
    pub relax_permissions: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        RecordConfig {
            snapshot_dir: PathBuf::from("snapshots"),
            pretty_print: true,
            relax_permissions: true,
        }
    }
}

impl RecordConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> RecapResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            RecapError::config(format!("Cannot read config file `{}`: {err}", path.display()))
        })?;
        let config: RecordConfig = toml::from_str(&content).map_err(|err| {
            RecapError::config(format!("Cannot parse config file `{}`: {err}", path.display()))
        })?;
        Ok(config.apply_env())
    }

    /// Apply environment overrides on top of this configuration
    pub fn apply_env(mut self) -> Self {
        if let Ok(dir) = std::env::var(SNAPSHOT_DIR_ENV) {
            self.snapshot_dir = PathBuf::from(dir);
        }
        self
    }
}
