//! HTTP server setup: route table, storage wiring and the serve loop.

pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, http::Method};
use chart_storage::{LocalFilesystemBackend, MemoryBackend, StorageBackend};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Config, StorageKind, MULTIPART_OVERHEAD_BYTES};
use crate::error::AppResult;
use crate::metrics;
use crate::router::{Classification, Handler, Route, RouteContext, Router};
use crate::state::AppState;

fn handler<F, Fut>(state: &AppState, f: F) -> Handler
where
    F: Fn(AppState, RouteContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<axum::response::Response>> + Send + 'static,
{
    let state = state.clone();
    Handler::new(move |ctx| f(state.clone(), ctx))
}

/// The full route table for `state`'s configuration.
pub fn routes(state: &AppState) -> Vec<Route> {
    use Classification::{Read, System, Write};

    let mut routes = vec![
        Route::new(Read, Method::GET, "/", handler(state, handlers::welcome)),
        Route::new(System, Method::GET, "/health", handler(state, handlers::health)),
    ];

    if state.metrics_handle.is_some() {
        routes.push(Route::new(
            System,
            Method::GET,
            "/metrics",
            handler(state, handlers::metrics),
        ));
    }

    routes.extend([
        Route::new(
            Read,
            Method::GET,
            "/:repo/index.yaml",
            handler(state, handlers::get_index),
        ),
        Route::new(
            Read,
            Method::GET,
            "/:repo/charts/:filename",
            handler(state, handlers::get_chart_file),
        ),
    ]);

    if state.config.repository.enable_api {
        routes.extend([
            Route::new(
                Read,
                Method::GET,
                "/api/:repo/charts",
                handler(state, handlers::list_charts),
            ),
            Route::new(
                Read,
                Method::GET,
                "/api/:repo/charts/:name",
                handler(state, handlers::get_chart),
            ),
            Route::new(
                Read,
                Method::GET,
                "/api/:repo/charts/:name/:version",
                handler(state, handlers::get_chart_version),
            ),
            Route::new(
                Read,
                Method::HEAD,
                "/api/:repo/charts/:name",
                handler(state, handlers::head_chart),
            ),
            Route::new(
                Read,
                Method::HEAD,
                "/api/:repo/charts/:name/:version",
                handler(state, handlers::head_chart_version),
            ),
            Route::new(
                Write,
                Method::POST,
                "/api/:repo/charts",
                handler(state, handlers::upload_chart),
            ),
            Route::new(
                Write,
                Method::POST,
                "/api/:repo/prov",
                handler(state, handlers::upload_provenance),
            ),
            Route::new(
                Write,
                Method::DELETE,
                "/api/:repo/charts/:name/:version",
                handler(state, handlers::delete_chart_version),
            ),
        ]);
    }

    routes
}

/// Build the axum application serving `state`.
pub fn app(state: AppState) -> axum::Router {
    let mut router = Router::new(state.config.router_config());
    router.set_routes(routes(&state));

    let body_limit = state
        .config
        .max_upload_size_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    router
        .into_service()
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Open the configured storage backend.
pub async fn open_storage(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match config.storage.backend {
        StorageKind::Local => {
            let backend = LocalFilesystemBackend::new(&config.storage.root_dir)
                .await
                .with_context(|| {
                    format!(
                        "failed to open storage directory {}",
                        config.storage.root_dir.display()
                    )
                })?;
            Arc::new(backend)
        }
        StorageKind::Memory => {
            warn!("Using in-memory storage; charts are lost on exit");
            Arc::new(MemoryBackend::new())
        }
    };
    info!(backend = storage.backend_name(), "Storage backend ready");
    Ok(storage)
}

/// Build the index of every repository in storage before serving.
///
/// A backend that cannot be listed fails startup.
pub async fn prime_indexes(state: &AppState) -> Result<Vec<String>> {
    let repos = state
        .indexes
        .prime(state.config.repository.depth)
        .await
        .context("failed to prime repository index")?;
    info!(repositories = repos.len(), "Repository indexes primed");
    Ok(repos)
}

/// Build the root repository's index once and return its bytes.
pub async fn generate_index(config: Config) -> Result<bytes::Bytes> {
    let storage = open_storage(&config).await?;
    let state = AppState::new(config, storage, None);
    let index = state
        .indexes
        .cache("")
        .sync_index()
        .await
        .context("failed to generate repository index")?;
    Ok(index.raw.clone())
}

/// Serve until Ctrl-C.
pub async fn run_server(config: Config) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        Some(metrics::install_prometheus_recorder()?)
    } else {
        None
    };

    let storage = open_storage(&config).await?;
    let addr = config.bind_address();
    let state = AppState::new(config, storage, metrics_handle);
    prime_indexes(&state).await?;

    info!(
        addr = %addr,
        context_path = %state.config.server.context_path,
        depth = state.config.repository.depth,
        index_limit = state.config.repository.index_limit,
        api = state.config.repository.enable_api,
        metrics = state.metrics_handle.is_some(),
        "Starting chart repository server"
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
