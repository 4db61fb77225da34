use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::errors::ManageResult;
use crate::models::{
    decode_file_id, FileStatsQuery, FileStatsReport, MessageResponse, RecordAccessRequest,
    StorageUsageQuery, StorageUsageResponse,
};
use crate::routes::ApiJson;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats/access", post(record_access))
        .route("/stats/files", get(file_stats))
        .route("/stats/storage", get(storage_usage))
}

#[utoipa::path(
    post,
    path = "/api/manage/stats/access",
    tag = "stats",
    request_body = RecordAccessRequest,
    responses(
        (status = 200, description = "Access recorded", body = MessageResponse),
        (status = 400, description = "File id missing"),
        (status = 404, description = "File not found")
    )
)]
pub async fn record_access(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RecordAccessRequest>,
) -> ManageResult<Json<MessageResponse>> {
    let file_id = decode_file_id(&request.file_id);
    state
        .stats_service()
        .record_access(&file_id, request.access_type, Utc::now())
        .await?;
    Ok(Json(MessageResponse::ok("Access recorded")))
}

/// Access statistics over a time window
#[utoipa::path(
    get,
    path = "/api/manage/stats/files",
    tag = "stats",
    params(FileStatsQuery),
    responses((status = 200, description = "Access totals, time series and per-file rows", body = FileStatsReport))
)]
pub async fn file_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileStatsQuery>,
) -> ManageResult<Json<FileStatsReport>> {
    Ok(Json(state.stats_service().file_stats(&query, Utc::now()).await?))
}

/// Storage usage by channel, type, size, directory and month
#[utoipa::path(
    get,
    path = "/api/manage/stats/storage",
    tag = "stats",
    params(StorageUsageQuery),
    responses((status = 200, description = "Storage usage, possibly cached", body = StorageUsageResponse))
)]
pub async fn storage_usage(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StorageUsageQuery>,
) -> ManageResult<Json<StorageUsageResponse>> {
    let (usage, cached) = state
        .stats_service()
        .storage_usage(query.refresh.unwrap_or(false), Utc::now())
        .await?;
    Ok(Json(StorageUsageResponse {
        success: true,
        cached,
        usage,
    }))
}
