/// Application configuration file
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::atlas::AtlasConfig;
use crate::notify::SmsConfig;

/// Top-level configuration, read from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub atlas: AtlasConfig,
    /// SMS gateway credentials; texting is unavailable without them
    #[serde(default)]
    pub sms: Option<SmsConfig>,
}

/// Where the document database lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("msubot.db"),
        }
    }
}

/// Errors that can occur while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid URL in {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        source: url::ParseError,
    },
}

impl AppConfig {
    /// Loads and validates a configuration file
    ///
    /// # Arguments
    /// * `path` - Path to the JSON file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` - Missing sections take their defaults
    /// * `Err(ConfigError)` - If the file can't be read or parsed, or a URL is invalid
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every configured URL parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.atlas.section_url).map_err(|source| ConfigError::InvalidUrl {
            field: "atlas.section_url",
            source,
        })?;
        if let Some(sms) = &self.sms {
            Url::parse(&sms.api_base).map_err(|source| ConfigError::InvalidUrl {
                field: "sms.api_base",
                source,
            })?;
        }
        Ok(())
    }
}
