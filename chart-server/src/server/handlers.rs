//! Route handlers.
//!
//! Every handler takes the shared [`AppState`] and the [`RouteContext`] the
//! router built for the request. Owned values are copied out of the context
//! before the first await.

use axum::{
    extract::{FromRequest, Multipart},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::index::chart::{chart_package_filename, provenance_filename, PROVENANCE_EXTENSION};
use crate::router::RouteContext;
use crate::state::{AppState, DeletedResponse, HealthResponse, SavedResponse};
use crate::validation::{
    self, validate_chart_name, validate_package_filename, validate_plain_filename,
    validate_provenance_filename, validate_version,
};

const INDEX_CONTENT_TYPE: &str = "application/x-yaml";
const PACKAGE_CONTENT_TYPE: &str = "application/x-tar";
const PROVENANCE_CONTENT_TYPE: &str = "application/pgp-signature";
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const WELCOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Chart Repository</title></head>
<body>
<h1>Chart Repository</h1>
<p>Add this repository with <code>helm repo add</code> and point it at the
<code>index.yaml</code> beneath this URL.</p>
</body>
</html>
"#;

fn required_param(ctx: &RouteContext, name: &str) -> AppResult<String> {
    ctx.param(name)
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(format!("missing path parameter: {name}")))
}

pub async fn welcome(_state: AppState, _ctx: RouteContext) -> AppResult<Response> {
    Ok(Html(WELCOME_PAGE).into_response())
}

pub async fn health(_state: AppState, _ctx: RouteContext) -> AppResult<Response> {
    Ok(Json(HealthResponse { healthy: true }).into_response())
}

pub async fn metrics(state: AppState, _ctx: RouteContext) -> AppResult<Response> {
    let handle = state
        .metrics_handle
        .as_ref()
        .ok_or_else(|| AppError::NotFound("metrics are disabled".to_string()))?;
    Ok(([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], handle.render()).into_response())
}

/// `GET /:repo/index.yaml`
pub async fn get_index(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let index = state.indexes.get_index(&repo).await?;
    debug!(repo = %repo, hash = %index.content_hash, "Serving repository index");
    Ok((
        [(header::CONTENT_TYPE, INDEX_CONTENT_TYPE)],
        index.raw.clone(),
    )
        .into_response())
}

/// `GET /:repo/charts/:filename`
pub async fn get_chart_file(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let filename = required_param(&ctx, "filename")?;
    validate_plain_filename(&filename)?;

    let key = state.object_key(&repo, &filename);
    let content = state.storage.get_object(&key).await?;
    let content_type = if filename.ends_with(PROVENANCE_EXTENSION) {
        PROVENANCE_CONTENT_TYPE
    } else {
        PACKAGE_CONTENT_TYPE
    };
    Ok(([(header::CONTENT_TYPE, content_type)], content).into_response())
}

/// `GET /api/:repo/charts`
pub async fn list_charts(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let index = state.indexes.get_index(&repo).await?;
    Ok(Json(&index.entries).into_response())
}

/// `GET /api/:repo/charts/:name`
pub async fn get_chart(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let name = required_param(&ctx, "name")?;
    let index = state.indexes.get_index(&repo).await?;
    let versions = index
        .chart(&name)
        .ok_or_else(|| AppError::NotFound(format!("chart not found: {name}")))?;
    Ok(Json(versions).into_response())
}

/// `GET /api/:repo/charts/:name/:version`
pub async fn get_chart_version(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let name = required_param(&ctx, "name")?;
    let version = required_param(&ctx, "version")?;
    let index = state.indexes.get_index(&repo).await?;
    let found = index
        .chart_version(&name, &version)
        .ok_or_else(|| AppError::NotFound(format!("chart version not found: {name}-{version}")))?;
    Ok(Json(found).into_response())
}

/// `HEAD /api/:repo/charts/:name`
pub async fn head_chart(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let name = required_param(&ctx, "name")?;
    let index = state.indexes.get_index(&repo).await?;
    Ok(presence(index.chart(&name).is_some()))
}

/// `HEAD /api/:repo/charts/:name/:version`
pub async fn head_chart_version(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let name = required_param(&ctx, "name")?;
    let version = required_param(&ctx, "version")?;
    let index = state.indexes.get_index(&repo).await?;
    Ok(presence(index.chart_version(&name, &version).is_some()))
}

fn presence(found: bool) -> Response {
    if found {
        StatusCode::OK.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// One file pulled out of a multipart upload.
struct UploadedFile {
    filename: String,
    content: Bytes,
}

/// Collect the chart and provenance parts of an upload form.
async fn read_upload_form(
    state: &AppState,
    ctx: RouteContext,
) -> AppResult<(Option<UploadedFile>, Option<UploadedFile>)> {
    let chart_field = state.config.repository.chart_post_field.clone();
    let prov_field = state.config.repository.prov_post_field.clone();

    let mut multipart = Multipart::from_request(ctx.request, &())
        .await
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let mut chart = None;
    let mut prov = None;
    let mut field_count = 0;

    while let Some(field) = multipart.next_field().await? {
        field_count += 1;
        if field_count > validation::MAX_MULTIPART_FIELDS {
            warn!(field_count, "Too many multipart fields");
            return Err(AppError::BadRequest(format!(
                "Too many multipart fields (max: {})",
                validation::MAX_MULTIPART_FIELDS
            )));
        }

        let name = field.name().unwrap_or("").to_string();
        let filename = field.file_name().map(str::to_string);
        let content = field.bytes().await?;
        debug!(field_name = %name, size = content.len(), "Processed multipart field");

        let slot = if name == chart_field {
            &mut chart
        } else if name == prov_field {
            &mut prov
        } else {
            continue;
        };
        let filename = filename.ok_or_else(|| {
            AppError::BadRequest(format!("missing filename in field '{name}'"))
        })?;
        *slot = Some(UploadedFile { filename, content });
    }

    Ok((chart, prov))
}

/// Storage key for an uploaded provenance file, refusing to replace one
/// unless overwrites are allowed.
async fn provenance_key(state: &AppState, repo: &str, prov: &UploadedFile) -> AppResult<String> {
    let (name, version) = validate_provenance_filename(&prov.filename)?;
    let key = state.object_key(repo, &provenance_filename(&name, &version));
    if !state.config.repository.allow_overwrite && state.storage.object_exists(&key).await? {
        return Err(AppError::Conflict(format!(
            "{} already exists",
            prov.filename
        )));
    }
    Ok(key)
}

async fn put_provenance(
    state: &AppState,
    repo: &str,
    key: &str,
    prov: &UploadedFile,
) -> AppResult<()> {
    state.storage.put_object(key, prov.content.clone()).await?;
    info!(repo = %repo, key = %key, size = prov.content.len(), "Provenance file stored");
    Ok(())
}

/// `POST /api/:repo/charts`
///
/// A provenance file sent alongside the package is validated up front and
/// written only after the package is stored.
pub async fn upload_chart(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let (chart, prov) = read_upload_form(&state, ctx).await?;

    let uploaded = match (chart, prov) {
        (Some(chart), prov) => {
            let (name, version) = validate_package_filename(&chart.filename)?;
            let key = state.object_key(&repo, &chart_package_filename(&name, &version));
            if !state.config.repository.allow_overwrite
                && state.storage.object_exists(&key).await?
            {
                return Err(AppError::Conflict(format!(
                    "{name}-{version} already exists"
                )));
            }
            let prov = match prov {
                Some(prov) => Some((provenance_key(&state, &repo, &prov).await?, prov)),
                None => None,
            };

            state.storage.put_object(&key, chart.content.clone()).await?;
            info!(
                repo = %repo,
                chart = %name,
                version = %version,
                size = chart.content.len(),
                "Chart package stored"
            );
            if let Some((prov_key, prov)) = prov {
                if let Err(e) = put_provenance(&state, &repo, &prov_key, &prov).await {
                    state.indexes.invalidate(&repo);
                    return Err(e);
                }
            }
            chart
        }
        (None, Some(prov)) => {
            let key = provenance_key(&state, &repo, &prov).await?;
            put_provenance(&state, &repo, &key, &prov).await?;
            prov
        }
        (None, None) => {
            return Err(AppError::BadRequest(format!(
                "no '{}' or '{}' field in upload",
                state.config.repository.chart_post_field, state.config.repository.prov_post_field
            )));
        }
    };

    state.indexes.invalidate(&repo);
    debug!(repo = %repo, filename = %uploaded.filename, "Upload complete");
    Ok((StatusCode::CREATED, Json(SavedResponse { saved: true })).into_response())
}

/// `POST /api/:repo/prov`
pub async fn upload_provenance(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let (_, prov) = read_upload_form(&state, ctx).await?;
    let prov = prov.ok_or_else(|| {
        AppError::BadRequest(format!(
            "no '{}' field in upload",
            state.config.repository.prov_post_field
        ))
    })?;

    let key = provenance_key(&state, &repo, &prov).await?;
    put_provenance(&state, &repo, &key, &prov).await?;
    state.indexes.invalidate(&repo);
    Ok((StatusCode::CREATED, Json(SavedResponse { saved: true })).into_response())
}

/// `DELETE /api/:repo/charts/:name/:version`
pub async fn delete_chart_version(state: AppState, ctx: RouteContext) -> AppResult<Response> {
    let repo = ctx.repo().to_string();
    let name = required_param(&ctx, "name")?;
    let version = required_param(&ctx, "version")?;
    validate_chart_name(&name)?;
    validate_version(&version)?;

    let key = state.object_key(&repo, &chart_package_filename(&name, &version));
    state.storage.delete_object(&key).await?;

    let prov_key = state.object_key(&repo, &provenance_filename(&name, &version));
    match state.storage.delete_object(&prov_key).await {
        Ok(()) => debug!(key = %prov_key, "Provenance file deleted"),
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!(key = %prov_key, error = %e, "Failed to delete provenance file"),
    }

    state.indexes.invalidate(&repo);
    info!(repo = %repo, chart = %name, version = %version, "Chart version deleted");
    Ok(Json(DeletedResponse { deleted: true }).into_response())
}
