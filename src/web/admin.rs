use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::identity::Admin;
use super::routes::{json_body, query_params};
use super::AppState;
use crate::db::{get_preview_dead_letters, get_work, reset_preview_attempts};
use crate::dedup::{remove_duplicates, DELETE_CHUNK_SIZE};
use crate::preview::service::RAR_UNSUPPORTED;

const DEAD_LETTER_LIMIT: i64 = 100;

/// Create the router with operator-only routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/remove-duplicates", post(remove_duplicates_handler))
        .route("/admin/inspect-archive", get(inspect_archive))
        .route("/admin/preview-dead-letters", get(preview_dead_letters))
        .route("/admin/preview-reset", post(preview_reset))
}

#[derive(Debug, Default, Deserialize)]
pub struct DedupParams {
    dry_run: Option<bool>,
}

async fn remove_duplicates_handler(
    State(state): State<AppState>,
    Admin(email): Admin,
    params: Result<Query<DedupParams>, QueryRejection>,
) -> ApiResult<Response> {
    let params = query_params(params)?;
    let dry_run = params.dry_run.unwrap_or(false);

    info!(admin = %email, dry_run, "Duplicate removal requested");
    let report = remove_duplicates(state.db.pool(), DELETE_CHUNK_SIZE, dry_run).await?;

    let message = if dry_run {
        format!("Found {} duplicate works", report.found)
    } else {
        format!("Removed {} duplicate works", report.removed)
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "duplicate_groups": report.duplicate_groups,
        "found": report.found,
        "removed": report.removed,
        "dry_run": report.dry_run,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct WorkIdParams {
    work_id: Option<i64>,
}

async fn inspect_archive(
    State(state): State<AppState>,
    Admin(_): Admin,
    params: Result<Query<WorkIdParams>, QueryRejection>,
) -> ApiResult<Response> {
    let params = query_params(params)?;
    let work_id = params.work_id.ok_or(ApiError::MissingField("work_id"))?;

    let work = get_work(state.db.pool(), work_id)
        .await?
        .ok_or(ApiError::NotFound("Work"))?;
    let download_url = work
        .download_url
        .as_deref()
        .ok_or_else(|| ApiError::InvalidRequest("work has no download URL".to_string()))?;

    let archive = match state.extractor.fetcher().fetch(download_url).await {
        Ok(archive) => archive,
        Err(e) => {
            warn!(work_id, error = %e, "Archive inspection download failed");
            return Ok(Json(json!({
                "success": false,
                "work_id": work_id,
                "url": download_url,
                "error": e.to_string(),
            }))
            .into_response());
        }
    };

    // `fetch` rejects unknown signatures, so only ZIP and RAR reach here.
    let conclusion = if archive.can_extract() {
        "ZIP archive, previews can be extracted"
    } else {
        RAR_UNSUPPORTED
    };

    Ok(Json(json!({
        "success": true,
        "work_id": work_id,
        "url": archive.url,
        "kind": archive.kind.as_str(),
        "size_bytes": archive.bytes.len(),
        "can_extract": archive.can_extract(),
        "conclusion": conclusion,
    }))
    .into_response())
}

async fn preview_dead_letters(
    State(state): State<AppState>,
    Admin(_): Admin,
) -> ApiResult<Response> {
    let max_attempts = state.config.preview_max_attempts;
    let works = get_preview_dead_letters(state.db.pool(), max_attempts, DEAD_LETTER_LIMIT).await?;

    Ok(Json(json!({
        "success": true,
        "max_attempts": max_attempts,
        "works": works,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct PreviewResetRequest {
    work_id: Option<i64>,
}

async fn preview_reset(
    State(state): State<AppState>,
    Admin(email): Admin,
    payload: Result<Json<PreviewResetRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = json_body(payload)?;
    let work_id = request.work_id.ok_or(ApiError::MissingField("work_id"))?;

    get_work(state.db.pool(), work_id)
        .await?
        .ok_or(ApiError::NotFound("Work"))?;

    reset_preview_attempts(state.db.pool(), work_id).await?;
    info!(admin = %email, work_id, "Preview attempts reset");

    Ok(Json(json!({ "success": true, "work_id": work_id })).into_response())
}
