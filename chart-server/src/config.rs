//! # Configuration Management
//!
//! Server configuration, loaded from a JSON file with every section optional:
//!
//! - [`ServerConfig`]: bind address and context path
//! - [`StorageConfig`]: which backend holds the charts
//! - [`RepositoryConfig`]: repository layout, upload rules and API switches
//! - [`MetricsConfig`] and [`LoggingConfig`]
//!
//! ```rust,no_run
//! # use chart_server::config::Config;
//! // Falls back to defaults when the file does not exist
//! let config = Config::load_or_default("chart-server.json")?;
//! config.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::router::RouterConfig;

/// Multipart framing allowed on top of the configured upload size.
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub repository: RepositoryConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix all routes live beneath, e.g. `/charts`. Empty for none.
    pub context_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            context_path: String::new(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    /// Root directory for the local backend.
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Local,
            root_dir: PathBuf::from("./chartstorage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Segments a repository path may span. 0 serves a single root repository.
    pub depth: usize,
    /// Absolute base for chart URLs in the index; relative URLs when unset.
    pub chart_url: Option<String>,
    pub allow_overwrite: bool,
    pub enable_api: bool,
    pub chart_post_field: String,
    pub prov_post_field: String,
    pub max_upload_size_mb: usize,
    /// Repositories allowed to regenerate their index at once. 0 for no limit.
    pub index_limit: usize,
    /// Print the index to stdout and exit instead of serving.
    pub gen_index: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            depth: 0,
            chart_url: None,
            allow_overwrite: false,
            enable_api: true,
            chart_post_field: "chart".to_string(),
            prov_post_field: "prov".to_string(),
            max_upload_size_mb: 20,
            index_limit: 0,
            gen_index: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub debug: bool,
    pub json: bool,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from a JSON file, or defaults when it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        let context_path = &self.server.context_path;
        if !context_path.is_empty()
            && (!context_path.starts_with('/') || context_path.ends_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "context path must start with '/' and not end with '/': {context_path}"
            )));
        }
        if self.repository.max_upload_size_mb == 0 {
            return Err(ConfigError::Invalid(
                "max upload size must be greater than zero".to_string(),
            ));
        }
        if self.checked_upload_size_bytes().is_none() {
            return Err(ConfigError::Invalid(format!(
                "max upload size is too large: {} MB",
                self.repository.max_upload_size_mb
            )));
        }
        let repository = &self.repository;
        if repository.chart_post_field.is_empty() || repository.prov_post_field.is_empty() {
            return Err(ConfigError::Invalid(
                "multipart field names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload limit in bytes, saturating for sizes [`validate`](Self::validate) rejects.
    pub fn max_upload_size_bytes(&self) -> usize {
        self.checked_upload_size_bytes().unwrap_or(usize::MAX)
    }

    fn checked_upload_size_bytes(&self) -> Option<usize> {
        self.repository
            .max_upload_size_mb
            .checked_mul(1024 * 1024)?
            .checked_add(MULTIPART_OVERHEAD_BYTES)
            .map(|total| total - MULTIPART_OVERHEAD_BYTES)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            context_path: self.server.context_path.clone(),
            repo_path_depth: self.repository.depth,
            metrics_enabled: self.metrics.enabled,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
