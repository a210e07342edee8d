//! End-to-end chart repository flows over the HTTP surface.

mod common;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use bytes::Bytes;
use chart_server::config::StorageKind;
use chart_server::{app, prime_indexes, AppState};
use chart_storage::{
    LocalFilesystemBackend, MemoryBackend, StorageBackend, StorageError, StorageObject,
    StorageResult,
};
use common::{create_test_setup, test_config, upload_chart};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Memory storage that can refuse package writes or all listings.
#[derive(Default)]
struct FlakyStorage {
    inner: MemoryBackend,
    reject_packages: AtomicBool,
    reject_listing: AtomicBool,
}

#[async_trait]
impl StorageBackend for FlakyStorage {
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<StorageObject>> {
        if self.reject_listing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("listing refused".to_string()));
        }
        self.inner.list_objects(prefix).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get_object(key).await
    }

    async fn put_object(&self, key: &str, content: Bytes) -> StorageResult<()> {
        if self.reject_packages.load(Ordering::SeqCst) && key.ends_with(".tgz") {
            return Err(StorageError::Unavailable("write refused".to_string()));
        }
        self.inner.put_object(key, content).await
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.inner.delete_object(key).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky-memory"
    }
}

#[tokio::test]
async fn test_health_and_welcome() {
    let setup = create_test_setup(test_config(0, ""));

    let response = setup.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), serde_json::json!({"healthy": true}));

    let response = setup.server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("Chart Repository"));
}

#[tokio::test]
async fn test_upload_index_download_delete() {
    let setup = create_test_setup(test_config(0, ""));
    let server = &setup.server;

    let response = upload_chart(server, "/api/charts", "mychart-0.1.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    assert_eq!(response.json::<Value>(), serde_json::json!({"saved": true}));

    let response = server.get("/index.yaml").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "application/x-yaml"
    );
    let index = response.text();
    assert!(index.contains("apiVersion: v1"));
    assert!(index.contains("mychart"));
    assert!(index.contains("charts/mychart-0.1.0.tgz"));

    let response = server.get("/charts/mychart-0.1.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.as_bytes().as_ref(), b"fake chart archive");

    let response = server.get("/api/charts/mychart/0.1.0").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["version"], "0.1.0");

    let response = server.delete("/api/charts/mychart/0.1.0").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), serde_json::json!({"deleted": true}));

    let index = server.get("/index.yaml").await.text();
    assert!(!index.contains("mychart"));

    let response = server.delete("/api/charts/mychart/0.1.0").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_upload_conflicts_unless_overwrite() {
    let setup = create_test_setup(test_config(0, ""));
    let first = upload_chart(&setup.server, "/api/charts", "mychart-0.1.0.tgz").await;
    assert_eq!(first.status_code(), StatusCode::CREATED);
    let second = upload_chart(&setup.server, "/api/charts", "mychart-0.1.0.tgz").await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);
    assert_eq!(second.json::<Value>()["code"], "conflict");

    let mut config = test_config(0, "");
    config.repository.allow_overwrite = true;
    let setup = create_test_setup(config);
    for _ in 0..2 {
        let response = upload_chart(&setup.server, "/api/charts", "mychart-0.1.0.tgz").await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_invalid_uploads_are_rejected() {
    let setup = create_test_setup(test_config(0, ""));

    let response = upload_chart(&setup.server, "/api/charts", "not-a-chart.txt").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = upload_chart(&setup.server, "/api/charts", "nochartversion.tgz").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let form = axum_test::multipart::MultipartForm::new().add_text("other", "value");
    let response = setup.server.post("/api/charts").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    assert!(setup.storage.is_empty().await);
}

#[tokio::test]
async fn test_chart_listing_and_head() {
    let setup = create_test_setup(test_config(0, ""));
    let server = &setup.server;
    for filename in ["alpha-1.0.0.tgz", "alpha-1.10.0.tgz", "beta-0.2.0.tgz"] {
        upload_chart(server, "/api/charts", filename).await;
    }

    let listing = server.get("/api/charts").await.json::<Value>();
    assert_eq!(listing["alpha"].as_array().unwrap().len(), 2);
    assert_eq!(listing["alpha"][0]["version"], "1.10.0");
    assert_eq!(listing["beta"][0]["name"], "beta");

    let latest = server.get("/api/charts/alpha/latest").await.json::<Value>();
    assert_eq!(latest["version"], "1.10.0");

    assert_eq!(
        server.get("/api/charts/gamma").await.status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        server.method(Method::HEAD, "/api/charts/alpha").await.status_code(),
        StatusCode::OK
    );
    assert_eq!(
        server
            .method(Method::HEAD, "/api/charts/alpha/9.9.9")
            .await
            .status_code(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_provenance_upload_and_download() {
    let setup = create_test_setup(test_config(0, ""));
    let part = axum_test::multipart::Part::bytes(b"-----BEGIN PGP SIGNED MESSAGE-----".to_vec())
        .file_name("mychart-0.1.0.tgz.prov");
    let form = axum_test::multipart::MultipartForm::new().add_part("prov", part);

    let response = setup.server.post("/api/prov").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let response = setup.server.get("/charts/mychart-0.1.0.tgz.prov").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "application/pgp-signature"
    );
}

#[tokio::test]
async fn test_multi_tenant_repositories_are_isolated() {
    let setup = create_test_setup(test_config(2, ""));
    let server = &setup.server;

    let response = upload_chart(server, "/api/org/team/charts", "foo-1.0.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let response = upload_chart(server, "/api/other/charts", "bar-2.0.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    assert!(setup
        .storage
        .object_exists("org/team/foo-1.0.0.tgz")
        .await
        .unwrap());

    let team_index = server.get("/org/team/index.yaml").await.text();
    assert!(team_index.contains("foo"));
    assert!(!team_index.contains("bar"));

    let other_index = server.get("/other/index.yaml").await.text();
    assert!(other_index.contains("bar"));

    // A repository literally named "api" still resolves.
    let response = upload_chart(server, "/api/api/charts", "baz-1.0.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    assert!(server.get("/api/index.yaml").await.text().contains("baz"));

    assert_eq!(
        server.get("/a/b/c/index.yaml").await.status_code(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_context_path_serving() {
    let setup = create_test_setup(test_config(1, "/charts"));
    let server = &setup.server;

    let response = upload_chart(server, "/charts/api/stable/charts", "foo-1.0.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    assert_eq!(
        server.get("/charts/stable/index.yaml").await.status_code(),
        StatusCode::OK
    );
    assert_eq!(server.get("/charts/health").await.status_code(), StatusCode::OK);
    assert_eq!(
        server.get("/stable/index.yaml").await.status_code(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_api_can_be_disabled() {
    let mut config = test_config(0, "");
    config.repository.enable_api = false;
    let setup = create_test_setup(config);

    let response = upload_chart(&setup.server, "/api/charts", "foo-1.0.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        setup.server.get("/index.yaml").await.status_code(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let setup = create_test_setup(test_config(0, ""));
    let response = setup.server.get("/no/such/thing").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["code"], "not_found");
    assert!(response.maybe_header("x-request-id").is_some());
}

#[tokio::test]
async fn test_filesystem_storage_backend() {
    let temp_dir = tempfile::TempDir::new().expect("should create temp dir");
    let mut config = test_config(0, "");
    config.storage.backend = StorageKind::Local;
    config.storage.root_dir = temp_dir.path().to_path_buf();

    let storage = Arc::new(
        LocalFilesystemBackend::new(temp_dir.path())
            .await
            .expect("should open storage"),
    );
    storage
        .put_object("existing-0.5.0.tgz", Bytes::from_static(b"pre-seeded"))
        .await
        .unwrap();

    let state = AppState::new(config, storage, None);
    let server = axum_test::TestServer::new(app(state)).expect("should create test server");

    let index = server.get("/index.yaml").await.text();
    assert!(index.contains("existing"));

    let response = upload_chart(&server, "/api/charts", "fresh-1.0.0.tgz").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    assert!(temp_dir.path().join("fresh-1.0.0.tgz").exists());
    assert!(server.get("/index.yaml").await.text().contains("fresh"));
}

#[tokio::test]
async fn test_unknown_repositories_do_not_accumulate_caches() {
    let setup = create_test_setup(test_config(1, ""));
    let server = &setup.server;

    for i in 0..100 {
        let response = server.get(&format!("/nonexistent{i}/index.yaml")).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        server.get(&format!("/api/nonexistent{i}/charts/foo")).await;
    }
    assert!(setup.state.indexes.repositories().is_empty());

    upload_chart(server, "/api/real/charts", "foo-1.0.0.tgz").await;
    assert!(server.get("/real/index.yaml").await.text().contains("foo"));
    assert_eq!(setup.state.indexes.repositories(), vec!["real"]);
}

#[tokio::test]
async fn test_percent_encoded_version_is_decoded() {
    let setup = create_test_setup(test_config(0, ""));
    let response = upload_chart(&setup.server, "/api/charts", "foo-1.0.0+build.tgz").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let response = setup.server.get("/api/charts/foo/1.0.0%2Bbuild").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["version"], "1.0.0+build");
}

#[tokio::test]
async fn test_failed_package_write_leaves_no_provenance() {
    let storage = Arc::new(FlakyStorage::default());
    storage.reject_packages.store(true, Ordering::SeqCst);
    let state = AppState::new(test_config(0, ""), storage.clone(), None);
    let server = axum_test::TestServer::new(app(state)).expect("should create test server");

    let form = MultipartForm::new()
        .add_part(
            "chart",
            Part::bytes(b"fake chart archive".to_vec()).file_name("foo-1.0.0.tgz"),
        )
        .add_part(
            "prov",
            Part::bytes(b"signature".to_vec()).file_name("foo-1.0.0.tgz.prov"),
        );
    let response = server.post("/api/charts").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(storage.inner.is_empty().await);
}

#[tokio::test]
async fn test_prime_indexes_builds_stored_repositories() {
    let storage = Arc::new(FlakyStorage::default());
    storage
        .inner
        .put_object("org/team/foo-1.0.0.tgz", Bytes::from_static(b"x"))
        .await
        .unwrap();
    let state = AppState::new(test_config(2, ""), storage.clone(), None);

    let primed = prime_indexes(&state).await.expect("should prime indexes");
    assert_eq!(primed, vec!["org/team"]);
    assert!(!state.indexes.cache("org/team").is_stale());

    storage.reject_listing.store(true, Ordering::SeqCst);
    let state = AppState::new(test_config(0, ""), storage, None);
    assert!(prime_indexes(&state).await.is_err());
}
