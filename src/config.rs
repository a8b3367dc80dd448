use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_PATH: &str = ".colloquy/config.toml";

/// Processor configuration from `.colloquy/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// How long the active conversation may go without a qualifying event
    /// before it is interrupted.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Maximum number of distinct chunk prefixes held in the orphan cache.
    /// Unset means unbounded.
    #[serde(default)]
    pub orphan_prefix_limit: Option<usize>,
}

fn default_response_timeout_ms() -> u64 {
    15_000
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            orphan_prefix_limit: None,
        }
    }
}

impl ProcessorConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Load configuration from `.colloquy/config.toml` under `dir`.
///
/// Falls back to defaults if the file is missing.
pub fn load(dir: &Path) -> Result<ProcessorConfig, ConfigError> {
    let path = dir.join(CONFIG_PATH);
    if !path.exists() {
        return Ok(ProcessorConfig::default());
    }
    load_file(&path)
}

/// Load configuration from an explicit file.
pub fn load_file(path: &Path) -> Result<ProcessorConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
