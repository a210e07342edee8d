//! Command-line interface. Flags override values from the config file.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, ConfigError, StorageKind};

#[derive(Debug, Parser)]
#[command(name = "chart-server")]
#[command(about = "Helm chart repository server with pluggable storage")]
#[command(version)]
pub struct Cli {
    /// JSON config file; defaults apply when it does not exist
    #[arg(long, default_value = "chart-server.json")]
    pub config: PathBuf,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(long)]
    pub port: Option<u16>,

    /// Prefix all routes are served beneath, e.g. /charts
    #[arg(long)]
    pub context_path: Option<String>,

    /// Storage backend
    #[arg(long, value_enum)]
    pub storage: Option<StorageKind>,

    /// Root directory for local storage
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Number of path segments a repository name may span (0 = single repository)
    #[arg(long)]
    pub depth: Option<usize>,

    /// Absolute base URL for chart downloads listed in the index
    #[arg(long)]
    pub chart_url: Option<String>,

    /// Repositories allowed to regenerate their index at once (0 = no limit)
    #[arg(long)]
    pub index_limit: Option<usize>,

    /// Allow uploads to replace existing chart versions
    #[arg(long)]
    pub allow_overwrite: bool,

    /// Disable the /api routes
    #[arg(long)]
    pub disable_api: bool,

    /// Expose Prometheus metrics at /metrics
    #[arg(long)]
    pub enable_metrics: bool,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Print the repository index to stdout and exit
    #[arg(long)]
    pub gen_index: bool,
}

impl Cli {
    /// Load the config file and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load_or_default(&self.config)?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(context_path) = &self.context_path {
            config.server.context_path = context_path.clone();
        }
        if let Some(storage) = self.storage {
            config.storage.backend = storage;
        }
        if let Some(dir) = &self.storage_dir {
            config.storage.root_dir = dir.clone();
        }
        if let Some(depth) = self.depth {
            config.repository.depth = depth;
        }
        if let Some(url) = &self.chart_url {
            config.repository.chart_url = Some(url.clone());
        }
        if let Some(limit) = self.index_limit {
            config.repository.index_limit = limit;
        }
        config.repository.allow_overwrite |= self.allow_overwrite;
        if self.disable_api {
            config.repository.enable_api = false;
        }
        config.metrics.enabled |= self.enable_metrics;
        config.logging.debug |= self.debug;
        config.logging.json |= self.log_json;
        config.repository.gen_index |= self.gen_index;
    }
}
