// ⚙️ Configuration - TOML file + defaults
//
// Every key is optional. Command-line flags override whatever is loaded here.

use crate::error::{IngestError, Result};
use crate::ingestion::IngestOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_PATH: &str = "ati.db";
pub const DEFAULT_LOG_FILTER: &str = "ati_ingest=info";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// tracing-subscriber directive used when RUST_LOG is unset
    pub log_filter: String,
    pub ingestion: IngestOptions,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            ingestion: IngestOptions::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(AppConfig::default());
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Read config {} failed: {}", path.display(), e))
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| IngestError::Config(format!("Parse TOML failed: {}", e)))?;

        config
            .ingestion
            .validate()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        Ok(config)
    }
}
