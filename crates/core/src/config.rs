use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::source::ArchSpec;

/// Default bound for ordinary commands.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default bound for the whole-binary analysis pass.
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 300;

/// Serializable settings for opening a session.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Explicit engine executable. Falls back to `RIZIN_BIN`, then `rizin` on `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rizin_path: Option<PathBuf>,
    /// Base address for PIE binaries. `None` lets the engine decide.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_addr: Option<u64>,
    /// Address the file or buffer is mapped at.
    pub load_addr: u64,
    /// Architecture for raw buffers when the caller has none of its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<ArchSpec>,
    /// Per-command bound in seconds; `None` blocks indefinitely.
    pub command_timeout_secs: Option<u64>,
    /// Bound for the analysis pass in seconds; `None` blocks indefinitely.
    pub analysis_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rizin_path: None,
            base_addr: None,
            load_addr: 0,
            arch: None,
            command_timeout_secs: Some(DEFAULT_COMMAND_TIMEOUT_SECS),
            analysis_timeout_secs: Some(DEFAULT_ANALYSIS_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    /// Read a JSON config file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session config at {}", path.display()))?;
        let config: SessionConfig =
            serde_json::from_str(&body).context("Failed to parse session config JSON")?;
        Ok(config)
    }

    pub fn with_base_addr(mut self, base_addr: u64) -> Self {
        self.base_addr = Some(base_addr);
        self
    }

    pub fn with_load_addr(mut self, load_addr: u64) -> Self {
        self.load_addr = load_addr;
        self
    }

    pub fn with_arch(mut self, arch: Option<ArchSpec>) -> Self {
        self.arch = arch;
        self
    }

    pub fn with_rizin_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rizin_path = Some(path.into());
        self
    }

    /// Override both bounds at once; `None` disables the bound.
    pub fn with_timeouts(mut self, command: Option<u64>, analysis: Option<u64>) -> Self {
        self.command_timeout_secs = command;
        self.analysis_timeout_secs = analysis;
        self
    }

    /// Engine executable to launch.
    pub fn resolve_rizin_path(&self) -> PathBuf {
        self.rizin_path
            .clone()
            .or_else(|| std::env::var_os("RIZIN_BIN").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("rizin"))
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn analysis_timeout(&self) -> Option<Duration> {
        self.analysis_timeout_secs.map(Duration::from_secs)
    }
}
