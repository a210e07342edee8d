//! # Application State
//!
//! Shared resources handed to every route handler. Cheap to clone: everything
//! inside is reference counted.

use chart_storage::{join_key, StorageBackend};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::index::{storage_prefix, IndexBuilder, IndexRegistry};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn StorageBackend>,
    /// One coalescing index cache per repository path
    pub indexes: Arc<IndexRegistry>,
    /// Present when the Prometheus recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        storage: Arc<dyn StorageBackend>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        let builder = IndexBuilder::new(
            Arc::new(crate::index::FilenameExtractor),
            config.repository.chart_url.clone(),
        );
        let indexes = Arc::new(
            IndexRegistry::new(Arc::clone(&storage), builder)
                .with_index_limit(config.repository.index_limit),
        );
        Self {
            config: Arc::new(config),
            storage,
            indexes,
            metrics_handle,
        }
    }

    /// Full storage key of `filename` inside `repo`.
    pub fn object_key(&self, repo: &str, filename: &str) -> String {
        join_key(&storage_prefix(repo), filename)
    }
}

/// `{"saved": true}`
#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub saved: bool,
}

/// `{"deleted": true}`
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// `{"healthy": true}`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
}
