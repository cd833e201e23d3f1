//! Sigil configuration file handling
//!
//! Configuration is TOML, stored at `<data-dir>/config.toml`. A missing file
//! is not an error: every field has a default. Command-line flags override
//! the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use sigil::store::default_data_dir;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigilConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the identity store lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; the identity is under `<data_dir>/storage/identity/`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl SigilConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            storage: StorageConfig { data_dir },
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit `config_path` must exist. Otherwise the file is looked up
    /// in the data directory and defaults are used if it is absent. A
    /// `data_dir` override always wins over the file.
    pub fn resolve(
        config_path: Option<&Path>,
        data_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => {
                let dir = data_dir.map_or_else(default_data_dir, Path::to_path_buf);
                let path = default_config_path(&dir);
                if path.exists() {
                    Self::load(&path)?
                } else {
                    Self::new(dir)
                }
            }
        };

        if let Some(dir) = data_dir {
            config.storage.data_dir = dir.to_path_buf();
        }
        Ok(config)
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_config(path, &contents)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# Sigil Configuration
#
# Command-line flags (--data-dir) override values in this file.

[storage]
# Data directory. The identity key bundle is read from
# <data_dir>/storage/identity/identity_key and its salt from
# <data_dir>/storage/salt
data_dir = "{data_dir}"

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/sigil/sigil.log"
"#,
            data_dir = data_dir.display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path, data_dir: &Path) -> Result<(), ConfigError> {
        write_config(config_path, &Self::generate_default_toml(data_dir))
    }
}

fn write_config(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, contents).map_err(write_error)
}

/// Config file location for a data directory
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}
