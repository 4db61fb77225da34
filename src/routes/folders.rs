use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::errors::ManageResult;
use crate::models::{
    BatchCreateFoldersRequest, BatchCreateFoldersResponse, CreateFolderRequest, FolderData,
    FolderResponse,
};
use crate::routes::ApiJson;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/folders/create", post(create_folder))
        .route("/folders/batch-create", post(batch_create_folders))
        .route("/folders/{*path}", get(get_folder))
}

#[utoipa::path(
    post,
    path = "/api/manage/folders/create",
    tag = "folders",
    request_body = CreateFolderRequest,
    responses(
        (status = 200, description = "Folder created", body = FolderResponse),
        (status = 400, description = "Missing or invalid folder name"),
        (status = 409, description = "Folder already exists")
    )
)]
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateFolderRequest>,
) -> ManageResult<Json<FolderResponse>> {
    let folder = state.folder_service().create_folder(request).await?;
    Ok(Json(FolderResponse {
        success: true,
        data: FolderData { folder },
    }))
}

#[utoipa::path(
    post,
    path = "/api/manage/folders/batch-create",
    tag = "folders",
    request_body = BatchCreateFoldersRequest,
    responses(
        (status = 200, description = "Per-folder outcome", body = BatchCreateFoldersResponse),
        (status = 400, description = "Empty or oversized folder list")
    )
)]
pub async fn batch_create_folders(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<BatchCreateFoldersRequest>,
) -> ManageResult<Json<BatchCreateFoldersResponse>> {
    let data = state.folder_service().batch_create(request).await?;
    Ok(Json(BatchCreateFoldersResponse { success: true, data }))
}

#[utoipa::path(
    get,
    path = "/api/manage/folders/{path}",
    tag = "folders",
    params(("path" = String, Path, description = "Full folder path")),
    responses(
        (status = 200, description = "Folder record", body = FolderResponse),
        (status = 404, description = "Folder not found")
    )
)]
pub async fn get_folder(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> ManageResult<Json<FolderResponse>> {
    let folder = state.folder_service().get_folder(&path).await?;
    Ok(Json(FolderResponse {
        success: true,
        data: FolderData { folder },
    }))
}
