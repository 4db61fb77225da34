use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::errors::ManageResult;
use crate::models::{
    decode_file_id, BatchFavoritesRequest, BatchRequest, BatchResult, BatchTagsRequest,
    DEFAULT_GROUP_ID,
};
use crate::routes::ApiJson;
use crate::services::batch_executor::{BatchOperation, BatchOutcome};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batch", post(run_batch))
        .route("/batch/tags/add", post(batch_add_tags))
        .route("/batch/favorites/add", post(batch_add_favorites))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchSummaryResponse {
    pub success: bool,
    pub message: String,
    pub results: BatchResult,
}

async fn execute(state: &AppState, operation: BatchOperation, items: &[String]) -> ManageResult<BatchResult> {
    let deadline = Duration::from_secs(state.config.batch_timeout_seconds);
    let BatchOutcome { result, followup } = state
        .batch_executor()
        .run_with_deadline(&operation, items, deadline)
        .await?;
    state.indices().spawn_followup(followup);
    Ok(result)
}

/// Delete, move or copy many files
#[utoipa::path(
    post,
    path = "/api/manage/batch",
    tag = "batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Per-item outcome, including partial failure", body = BatchResult),
        (status = 400, description = "Empty file list, unknown action or missing target path")
    )
)]
pub async fn run_batch(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> ManageResult<Json<BatchResult>> {
    let operation = BatchOperation::from_action(&request.action, request.target_path.as_deref())?;
    info!("Batch {} requested for {} files", operation.name(), request.files.len());
    let result = execute(&state, operation, &request.files).await?;
    Ok(Json(result))
}

/// Attach every listed tag to every listed file
#[utoipa::path(
    post,
    path = "/api/manage/batch/tags/add",
    tag = "batch",
    request_body = BatchTagsRequest,
    responses(
        (status = 200, description = "Per-item outcome", body = BatchSummaryResponse),
        (status = 400, description = "Empty file or tag list, or no valid tag")
    )
)]
pub async fn batch_add_tags(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<BatchTagsRequest>,
) -> ManageResult<Json<BatchSummaryResponse>> {
    let files: Vec<String> = request.file_ids.iter().map(|id| decode_file_id(id)).collect();
    let operation = BatchOperation::AddTags {
        tag_ids: request.tag_ids,
    };
    let results = execute(&state, operation, &files).await?;
    Ok(Json(BatchSummaryResponse {
        success: true,
        message: format!(
            "Batch operation completed: {} files processed successfully",
            results.success_count
        ),
        results,
    }))
}

/// Add every listed file to one favorite group
#[utoipa::path(
    post,
    path = "/api/manage/batch/favorites/add",
    tag = "batch",
    request_body = BatchFavoritesRequest,
    responses(
        (status = 200, description = "Per-item outcome; files already in the group are skipped", body = BatchSummaryResponse),
        (status = 400, description = "Empty file list"),
        (status = 404, description = "Favorite group not found")
    )
)]
pub async fn batch_add_favorites(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<BatchFavoritesRequest>,
) -> ManageResult<Json<BatchSummaryResponse>> {
    let files: Vec<String> = request.file_ids.iter().map(|id| decode_file_id(id)).collect();
    let group_id = request
        .group_id
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_GROUP_ID.to_string());
    let results = execute(&state, BatchOperation::AddToFavorites { group_id }, &files).await?;
    Ok(Json(BatchSummaryResponse {
        success: true,
        message: format!(
            "Batch operation completed: {} files added to favorites",
            results.success_count
        ),
        results,
    }))
}
