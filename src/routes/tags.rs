use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::errors::ManageResult;
use crate::models::{
    decode_file_id, FileTagsChangeResponse, FileTagsRequest, FileTagsResponse, TagListResponse,
    TagRequest, TagResponse,
};
use crate::routes::ApiJson;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{id}", put(update_tag).delete(delete_tag))
        .route(
            "/file-tags/{*path}",
            get(get_file_tags).post(add_file_tags).delete(remove_file_tags),
        )
}

#[utoipa::path(
    get,
    path = "/api/manage/tags",
    tag = "tags",
    responses((status = 200, description = "Every tag with its file count", body = TagListResponse))
)]
pub async fn list_tags(State(state): State<Arc<AppState>>) -> ManageResult<Json<TagListResponse>> {
    let tags = state.tag_service().list_tags().await?;
    Ok(Json(TagListResponse { success: true, tags }))
}

#[utoipa::path(
    post,
    path = "/api/manage/tags",
    tag = "tags",
    request_body = TagRequest,
    responses(
        (status = 200, description = "Tag created", body = TagResponse),
        (status = 400, description = "Name or color missing"),
        (status = 409, description = "Tag name already exists")
    )
)]
pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TagRequest>,
) -> ManageResult<Json<TagResponse>> {
    let tag = state.tag_service().create_tag(request).await?;
    Ok(Json(TagResponse { success: true, tag }))
}

#[utoipa::path(
    put,
    path = "/api/manage/tags/{id}",
    tag = "tags",
    params(("id" = String, Path, description = "Tag id")),
    request_body = TagRequest,
    responses(
        (status = 200, description = "Tag updated", body = TagResponse),
        (status = 404, description = "Tag not found"),
        (status = 409, description = "Tag name already exists")
    )
)]
pub async fn update_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<TagRequest>,
) -> ManageResult<Json<TagResponse>> {
    let tag = state.tag_service().update_tag(&id, request).await?;
    Ok(Json(TagResponse { success: true, tag }))
}

/// Delete a tag and detach it from every file
#[utoipa::path(
    delete,
    path = "/api/manage/tags/{id}",
    tag = "tags",
    params(("id" = String, Path, description = "Tag id")),
    responses(
        (status = 200, description = "Tag deleted"),
        (status = 404, description = "Tag not found")
    )
)]
pub async fn delete_tag(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ManageResult<Json<Value>> {
    let cleaned = state.tag_service().delete_tag(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Tag deleted successfully",
        "cleanedFiles": cleaned,
    })))
}

#[utoipa::path(
    get,
    path = "/api/manage/file-tags/{path}",
    tag = "tags",
    params(("path" = String, Path, description = "File path")),
    responses(
        (status = 200, description = "Tags of the file", body = FileTagsResponse),
        (status = 404, description = "File not found")
    )
)]
pub async fn get_file_tags(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> ManageResult<Json<FileTagsResponse>> {
    let file_id = decode_file_id(&path);
    let tags = state.tag_service().file_tags(&file_id).await?;
    Ok(Json(FileTagsResponse {
        success: true,
        file_id,
        tags,
    }))
}

#[utoipa::path(
    post,
    path = "/api/manage/file-tags/{path}",
    tag = "tags",
    params(("path" = String, Path, description = "File path")),
    request_body = FileTagsRequest,
    responses(
        (status = 200, description = "Tags attached", body = FileTagsChangeResponse),
        (status = 400, description = "No valid tag given"),
        (status = 404, description = "File not found")
    )
)]
pub async fn add_file_tags(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    ApiJson(request): ApiJson<FileTagsRequest>,
) -> ManageResult<Json<FileTagsChangeResponse>> {
    let file_id = decode_file_id(&path);
    let (changed, tags) = state.tag_service().add_file_tags(&file_id, &request.tag_ids).await?;
    Ok(Json(FileTagsChangeResponse {
        success: true,
        file_id,
        changed,
        tags,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/manage/file-tags/{path}",
    tag = "tags",
    params(("path" = String, Path, description = "File path")),
    request_body = FileTagsRequest,
    responses(
        (status = 200, description = "Tags detached", body = FileTagsChangeResponse),
        (status = 404, description = "File not found")
    )
)]
pub async fn remove_file_tags(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    ApiJson(request): ApiJson<FileTagsRequest>,
) -> ManageResult<Json<FileTagsChangeResponse>> {
    let file_id = decode_file_id(&path);
    let (changed, tags) = state
        .tag_service()
        .remove_file_tags(&file_id, &request.tag_ids)
        .await?;
    Ok(Json(FileTagsChangeResponse {
        success: true,
        file_id,
        changed,
        tags,
    }))
}
