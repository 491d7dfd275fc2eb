use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::identity::UserId;
use super::AppState;
use crate::constants::{
    MAX_SUBJECT_CHARS, MAX_TITLE_CHARS, MAX_WORK_TYPE_CHARS, UNKNOWN_WORK_TYPE,
};
use crate::db::{
    get_work, insert_work, list_categories, list_favorite_works, ping, toggle_favorite, NewWork,
    WorkStatus,
};
use crate::folder_name::{parse_folder_name_with, FolderParseMode};
use crate::preview::batch::DEFAULT_BATCH_SIZE;
use crate::preview::fetcher::encode_url_path;
use crate::preview::{
    run_preview_batch, BatchOptions, ExtractRequest, ExtractResponse, PreviewService,
};

/// Create the router with all public routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/categories", get(categories))
        .route("/works", post(create_work))
        .route("/works/:id/preview", get(work_preview))
        .route("/favorites", get(list_favorites))
        .route("/favorites/toggle", post(toggle_favorite_handler))
        .route("/preview/extract", post(extract_preview))
        .route(
            "/batch-extract-previews",
            get(batch_extract_previews).post(batch_extract_previews),
        )
}

pub(super) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
}

pub(super) fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

// ========== Health ==========

async fn health(State(state): State<AppState>) -> Response {
    match ping(state.db.pool()).await {
        Ok(()) => Json(json!({ "success": true, "status": "ok", "database": "ok" })).into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {e:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "status": "degraded",
                    "database": "error",
                    "error": "Database unavailable",
                })),
            )
                .into_response()
        }
    }
}

// ========== Catalog ==========

async fn categories(State(state): State<AppState>) -> ApiResult<Response> {
    let categories = list_categories(state.db.pool()).await?;
    Ok(Json(json!({ "success": true, "categories": categories })).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateWorkRequest {
    folder_name: Option<String>,
    title: Option<String>,
    work_type: Option<String>,
    subject: Option<String>,
    folder_path: Option<String>,
    download_url: Option<String>,
}

/// Turn an upload request into a catalog row, applying storage limits.
fn prepare_new_work(request: &CreateWorkRequest, mode: FolderParseMode) -> ApiResult<NewWork> {
    let subject = non_empty(request.subject.as_deref()).ok_or(ApiError::MissingField("subject"))?;

    let (title, work_type) = if let Some(folder_name) = non_empty(request.folder_name.as_deref()) {
        let parsed = parse_folder_name_with(folder_name, mode);
        (parsed.title, parsed.work_type)
    } else {
        let title = non_empty(request.title.as_deref())
            .ok_or(ApiError::MissingField("folder_name or title"))?;
        let work_type = non_empty(request.work_type.as_deref()).unwrap_or(UNKNOWN_WORK_TYPE);
        (title.to_string(), work_type.to_string())
    };

    let download_url = match non_empty(request.download_url.as_deref()) {
        Some(url) => Some(
            encode_url_path(url).map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
        ),
        None => None,
    };

    Ok(NewWork {
        title: truncate_chars(&title, MAX_TITLE_CHARS),
        work_type: truncate_chars(&work_type, MAX_WORK_TYPE_CHARS),
        subject: truncate_chars(subject, MAX_SUBJECT_CHARS),
        folder_path: non_empty(request.folder_path.as_deref()).map(str::to_string),
        download_url,
        status: WorkStatus::Pending,
    })
}

async fn create_work(
    State(state): State<AppState>,
    payload: Result<Json<CreateWorkRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = json_body(payload)?;
    let new_work = prepare_new_work(&request, state.config.folder_parse_mode)?;

    let id = insert_work(state.db.pool(), &new_work).await?;
    let work = get_work(state.db.pool(), id)
        .await?
        .ok_or(ApiError::NotFound("Work"))?;

    info!(work_id = id, title = %work.title, work_type = %work.work_type, "Work uploaded");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "work": work })),
    )
        .into_response())
}

async fn work_preview(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Response> {
    let Path(id) = id.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let work = get_work(state.db.pool(), id)
        .await?
        .filter(|w| !w.is_deleted())
        .ok_or(ApiError::NotFound("Work"))?;

    let Some(preview_image_url) = work.preview_image_url.as_deref() else {
        return Err(ApiError::NotFound("Preview"));
    };

    Ok(Json(json!({
        "success": true,
        "work_id": work.id,
        "preview_image_url": preview_image_url,
    }))
    .into_response())
}

// ========== Favorites ==========

#[derive(Debug, Deserialize)]
pub struct ToggleFavoriteRequest {
    work_id: Option<i64>,
}

async fn list_favorites(State(state): State<AppState>, UserId(user_id): UserId) -> ApiResult<Response> {
    let works = list_favorite_works(state.db.pool(), &user_id).await?;
    Ok(Json(json!({ "success": true, "works": works })).into_response())
}

async fn toggle_favorite_handler(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<ToggleFavoriteRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = json_body(payload)?;
    let work_id = request.work_id.ok_or(ApiError::MissingField("work_id"))?;

    get_work(state.db.pool(), work_id)
        .await?
        .filter(|w| !w.is_deleted())
        .ok_or(ApiError::NotFound("Work"))?;

    let favorited = toggle_favorite(state.db.pool(), &user_id, work_id).await?;

    Ok(Json(json!({ "success": true, "work_id": work_id, "favorited": favorited })).into_response())
}

// ========== Previews ==========

async fn extract_preview(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> ApiResult<Json<ExtractResponse>> {
    let request = json_body(payload)?;
    let work_id = request.work_id.ok_or(ApiError::MissingField("work_id"))?;
    if request.extract_from_archive != Some(true) {
        return Err(ApiError::InvalidRequest(
            "extract_from_archive must be true".to_string(),
        ));
    }

    let work = get_work(state.db.pool(), work_id)
        .await?
        .ok_or(ApiError::NotFound("Work"))?;

    let outcome = state.extractor.generate(&work).await;
    Ok(Json(ExtractResponse::from(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct BatchParams {
    batch_size: Option<String>,
}

fn parse_batch_size(raw: Option<&str>) -> ApiResult<i64> {
    let Some(raw) = non_empty(raw) else {
        return Ok(DEFAULT_BATCH_SIZE);
    };
    raw.parse::<i64>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| {
            ApiError::InvalidRequest(format!("batch_size must be a positive integer, got '{raw}'"))
        })
}

async fn batch_extract_previews(
    State(state): State<AppState>,
    params: Result<Query<BatchParams>, QueryRejection>,
) -> ApiResult<Response> {
    let params = query_params(params)?;
    let batch_size = parse_batch_size(params.batch_size.as_deref())?;
    let options = BatchOptions::from_config(&state.config, batch_size);

    let report = run_preview_batch(&state.db, state.batch_previews.as_ref(), &options).await?;
    Ok(Json(report).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(folder_name: Option<&str>, title: Option<&str>, subject: Option<&str>) -> CreateWorkRequest {
        CreateWorkRequest {
            folder_name: folder_name.map(str::to_string),
            title: title.map(str::to_string),
            subject: subject.map(str::to_string),
            ..CreateWorkRequest::default()
        }
    }

    #[test]
    fn test_prepare_new_work_from_folder_name() {
        let work = prepare_new_work(
            &request(Some("Анализ (вариант 2) (курсовая работа)"), None, Some("Экономика")),
            FolderParseMode::LastPair,
        )
        .unwrap();
        assert_eq!(work.title, "Анализ (вариант 2)");
        assert_eq!(work.work_type, "курсовая работа");
        assert_eq!(work.status, WorkStatus::Pending);
    }

    #[test]
    fn test_prepare_new_work_requires_fields() {
        assert!(matches!(
            prepare_new_work(&request(Some("A (B)"), None, None), FolderParseMode::LastPair),
            Err(ApiError::MissingField("subject"))
        ));
        assert!(matches!(
            prepare_new_work(&request(None, Some("  "), Some("Law")), FolderParseMode::LastPair),
            Err(ApiError::MissingField("folder_name or title"))
        ));
    }

    #[test]
    fn test_prepare_new_work_truncates_to_storage_limits() {
        let long_title = "Ж".repeat(MAX_TITLE_CHARS + 50);
        let long_type = "т".repeat(MAX_WORK_TYPE_CHARS + 5);
        let folder_name = format!("{long_title} ({long_type})");
        let work = prepare_new_work(
            &request(Some(&folder_name), None, Some(&"с".repeat(MAX_SUBJECT_CHARS * 2))),
            FolderParseMode::LastPair,
        )
        .unwrap();
        assert_eq!(work.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(work.work_type.chars().count(), MAX_WORK_TYPE_CHARS);
        assert_eq!(work.subject.chars().count(), MAX_SUBJECT_CHARS);
    }

    #[test]
    fn test_prepare_new_work_rejects_bad_download_url() {
        let mut req = request(None, Some("Title"), Some("Law"));
        req.download_url = Some("ftp://files/a.zip".to_string());
        assert!(matches!(
            prepare_new_work(&req, FolderParseMode::LastPair),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_batch_size() {
        assert_eq!(parse_batch_size(None).unwrap(), DEFAULT_BATCH_SIZE);
        assert_eq!(parse_batch_size(Some("")).unwrap(), DEFAULT_BATCH_SIZE);
        assert_eq!(parse_batch_size(Some("25")).unwrap(), 25);
        assert!(parse_batch_size(Some("0")).is_err());
        assert!(parse_batch_size(Some("ten")).is_err());
    }
}
