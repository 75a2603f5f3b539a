use serde::Deserialize;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::version::cache::DEFAULT_PARSE_CACHE_CAPACITY;

/// Default number of module/version pairs checked per run
pub const DEFAULT_PENDING_LIMIT: usize = 100;

/// Default log level when RUST_LOG is not set
pub const DEFAULT_LOG_LEVEL: &str = "info";

const APP_NAME: &str = "module-versions";

/// Engine configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub detector: DetectorConfig,
    pub log: LogConfig,
}

/// Parse cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entries kept before the cache is cleared
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_PARSE_CACHE_CAPACITY,
        }
    }
}

/// Update detector configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    /// Default limit for modules needing a check
    pub pending_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            pending_limit: DEFAULT_PENDING_LIMIT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    pub level: String,
    /// Also write JSON logs to a daily file in the log directory
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `config.json` in the data
    /// directory is used when present, and defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

/// Returns the path to the data directory for module-versions.
/// Uses $XDG_DATA_HOME/module-versions if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/module-versions,
/// or ./module-versions if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the default config file.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Returns the directory for log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_NAME)
}
