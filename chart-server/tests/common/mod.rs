//! Common test utilities and helpers

#![allow(dead_code)]

use axum_test::{
    multipart::{MultipartForm, Part},
    TestResponse, TestServer,
};
use chart_server::config::{Config, StorageKind};
use chart_server::{app, AppState};
use chart_storage::{MemoryBackend, StorageBackend};
use std::sync::Arc;

/// Config for an in-memory repository at the given depth and context path.
pub fn test_config(depth: usize, context_path: &str) -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageKind::Memory;
    config.repository.depth = depth;
    config.server.context_path = context_path.to_string();
    config
}

/// Test server plus handles on the state behind it.
pub struct TestSetup {
    pub server: TestServer,
    pub state: AppState,
    pub storage: Arc<MemoryBackend>,
}

pub fn create_test_setup(config: Config) -> TestSetup {
    let storage = Arc::new(MemoryBackend::new());
    let backend: Arc<dyn StorageBackend> = storage.clone();
    let state = AppState::new(config, backend, None);
    let server = TestServer::new(app(state.clone())).expect("should create test server");
    TestSetup {
        server,
        state,
        storage,
    }
}

pub fn chart_form(filename: &str, content: &[u8]) -> MultipartForm {
    let part = Part::bytes(content.to_vec())
        .file_name(filename)
        .mime_type("application/gzip");
    MultipartForm::new().add_part("chart", part)
}

pub async fn upload_chart(server: &TestServer, path: &str, filename: &str) -> TestResponse {
    server
        .post(path)
        .multipart(chart_form(filename, b"fake chart archive"))
        .await
}
