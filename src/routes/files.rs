use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::errors::ManageResult;
use crate::models::{decode_file_id, AccessType, Relocation};
use crate::routes::ApiJson;
use crate::services::index_manager::IndexFollowup;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/file/{*path}", get(get_file))
        .route("/rename/{*path}", post(rename_file))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    #[serde(default)]
    pub new_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameResponse {
    pub success: bool,
    pub old_file_id: String,
    pub new_file_id: String,
    pub new_name: String,
}

/// Raw file bytes, fetched through the file's channel
#[utoipa::path(
    get,
    path = "/api/manage/file/{path}",
    tag = "files",
    params(("path" = String, Path, description = "File path")),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "File not found"),
        (status = 500, description = "Recorded file is missing from its channel")
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> ManageResult<impl IntoResponse> {
    let file_id = decode_file_id(&path);
    let (record, data) = state.file_service().read_file(&file_id).await?;
    let content_type = record
        .metadata
        .file_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let stats = state.stats_service();
    tokio::spawn(async move {
        if let Err(e) = stats.record_access(&file_id, AccessType::View, Utc::now()).await {
            debug!("Could not record view of {}: {}", file_id, e);
        }
    });

    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

/// Replace the last segment of a file path
#[utoipa::path(
    post,
    path = "/api/manage/rename/{path}",
    tag = "files",
    params(("path" = String, Path, description = "File path")),
    request_body = RenameRequest,
    responses(
        (status = 200, description = "File renamed", body = RenameResponse),
        (status = 400, description = "New name missing or invalid"),
        (status = 404, description = "File not found"),
        (status = 409, description = "A file with the new name already exists")
    )
)]
pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    ApiJson(request): ApiJson<RenameRequest>,
) -> ManageResult<Json<RenameResponse>> {
    let old_file_id = decode_file_id(&path);
    let renamed = state
        .file_service()
        .rename_file(&old_file_id, &request.new_name)
        .await?;
    info!("Renamed {} to {}", old_file_id, renamed.path);

    state.indices().spawn_followup(IndexFollowup {
        removed: Vec::new(),
        moved: vec![Relocation {
            from: old_file_id.clone(),
            to: renamed.path.clone(),
        }],
    });

    Ok(Json(RenameResponse {
        success: true,
        old_file_id,
        new_name: request.new_name.trim().to_string(),
        new_file_id: renamed.path,
    }))
}
