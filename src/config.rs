use crate::nlp::KeywordTables;
use crate::offline::{OfflineConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "TOOLBOX_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the binary and the daemon need. Every field has a default, so
/// an empty JSON object is a valid config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolboxConfig {
    pub database_path: PathBuf,
    pub socket_path: PathBuf,
    /// Daemon log directory; file logging is off when unset.
    pub log_dir: Option<PathBuf>,
    pub keywords: KeywordTables,
    pub offline: OfflineConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("toolbox.db"),
            socket_path: std::env::temp_dir().join("toolbox.sock"),
            log_dir: None,
            keywords: KeywordTables::default(),
            offline: OfflineConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ToolboxConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the file named by `explicit`, else by `TOOLBOX_CONFIG`, else
    /// starts from defaults; then applies the environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(origin) = lookup("TOOLBOX_ORIGIN") {
            self.offline.origin = origin;
        }
        if let Some(path) = lookup("TOOLBOX_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("TOOLBOX_SOCKET") {
            self.socket_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("TOOLBOX_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(version) = lookup("TOOLBOX_CACHE_VERSION") {
            self.offline.cache_version = version;
        }
    }
}
