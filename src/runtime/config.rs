//! Bridge configuration
//!
//! Configuration is plain JSON. Missing fields take their defaults, so a
//! config file only needs to name what it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

/// How resolution failures on the single-action path are reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Well-formed response with an `EXECUTION_FAILED` status
    #[default]
    Status,
    /// Transport-level error for the whole call
    HardError,
}

/// Configuration for the bridge runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Pause between consecutive commands of one sequence, in nanoseconds
    pub pacing_ns: u64,

    /// Run the scheduling interference thread during batches
    pub interference: bool,

    /// Capture role states when a request does not say otherwise
    pub capture_state: bool,

    /// Reporting of unresolvable single actions
    pub resolution_failures: ResolutionPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pacing_ns: 1_000,
            interference: true,
            capture_state: false,
            resolution_failures: ResolutionPolicy::Status,
        }
    }
}

impl BridgeConfig {
    /// Inter-command pacing as a duration.
    pub fn pacing(&self) -> Duration {
        Duration::from_nanos(self.pacing_ns)
    }
}

/// Save configuration so that readers see either the old file or the new one.
///
/// The JSON goes to an anonymous temp file in the destination directory,
/// which is flushed to disk and then persisted under `path`.
pub fn write_config(path: &Path, config: &BridgeConfig) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage config in {:?}", dir))?;
    serde_json::to_writer_pretty(&mut staged, config).context("Failed to serialize config")?;
    staged.write_all(b"\n").context("Failed to write config")?;
    staged.as_file().sync_all().context("Failed to sync config")?;
    staged
        .persist(path)
        .with_context(|| format!("Failed to save config: {:?}", path))?;
    tracing::debug!(path = ?path, "config saved");
    Ok(())
}

/// Load configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let data = fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
    let config = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to deserialize config: {:?}", path))?;
    Ok(config)
}
