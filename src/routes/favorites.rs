use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::errors::ManageResult;
use crate::models::{
    decode_file_id, AddFavoriteRequest, CreateGroupRequest, FavoriteGroup, FavoriteResponse,
    FavoritesQuery, FileEntry, GroupListResponse, GroupResponse, RemoveFavoriteQuery,
    RemoveFavoriteResponse,
};
use crate::routes::ApiJson;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/favorites/groups", get(list_groups).post(create_group))
        .route("/favorites/groups/{id}", delete(delete_group))
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/{*path}", delete(remove_favorite))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteListResponse {
    pub success: bool,
    pub group: FavoriteGroup,
    pub files: Vec<FileEntry>,
    pub total: usize,
    pub start: usize,
    pub count: usize,
    pub has_more: bool,
}

#[utoipa::path(
    get,
    path = "/api/manage/favorites/groups",
    tag = "favorites",
    responses((status = 200, description = "Favorite groups, default first", body = GroupListResponse))
)]
pub async fn list_groups(State(state): State<Arc<AppState>>) -> ManageResult<Json<GroupListResponse>> {
    let groups = state.favorite_service().list_groups().await?;
    Ok(Json(GroupListResponse { success: true, groups }))
}

#[utoipa::path(
    post,
    path = "/api/manage/favorites/groups",
    tag = "favorites",
    request_body = CreateGroupRequest,
    responses(
        (status = 200, description = "Group created", body = GroupResponse),
        (status = 400, description = "Group name missing"),
        (status = 409, description = "Group name already exists")
    )
)]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateGroupRequest>,
) -> ManageResult<Json<GroupResponse>> {
    let group = state.favorite_service().create_group(request).await?;
    Ok(Json(GroupResponse { success: true, group }))
}

#[utoipa::path(
    delete,
    path = "/api/manage/favorites/groups/{id}",
    tag = "favorites",
    params(("id" = String, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group and its favorites deleted"),
        (status = 400, description = "The default group cannot be deleted"),
        (status = 404, description = "Favorite group not found")
    )
)]
pub async fn delete_group(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ManageResult<Json<Value>> {
    let removed = state.favorite_service().delete_group(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Favorite group deleted successfully",
        "removedFavorites": removed,
    })))
}

#[utoipa::path(
    get,
    path = "/api/manage/favorites",
    tag = "favorites",
    params(FavoritesQuery),
    responses(
        (status = 200, description = "One page of a favorite group", body = FavoriteListResponse),
        (status = 404, description = "Favorite group not found")
    )
)]
pub async fn list_favorites(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FavoritesQuery>,
) -> ManageResult<Json<FavoriteListResponse>> {
    let count = query.count.unwrap_or(state.config.default_page_size);
    let result = state
        .favorite_service()
        .list_favorites(
            query.group_id.as_deref(),
            query.sort_by.unwrap_or_default(),
            query.sort_order.unwrap_or_default(),
            query.start.unwrap_or(0),
            count,
        )
        .await?;
    let page = result.page;
    Ok(Json(FavoriteListResponse {
        success: true,
        group: result.group,
        count: page.items.len(),
        files: page.items,
        total: page.total,
        start: page.start,
        has_more: page.has_more,
    }))
}

#[utoipa::path(
    post,
    path = "/api/manage/favorites",
    tag = "favorites",
    request_body = AddFavoriteRequest,
    responses(
        (status = 200, description = "File added to the group", body = FavoriteResponse),
        (status = 400, description = "File id missing"),
        (status = 404, description = "File or group not found"),
        (status = 409, description = "File is already in favorites")
    )
)]
pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    ApiJson(mut request): ApiJson<AddFavoriteRequest>,
) -> ManageResult<Json<FavoriteResponse>> {
    request.file_id = decode_file_id(&request.file_id);
    let favorite = state.favorite_service().add_favorite(request).await?;
    Ok(Json(FavoriteResponse {
        success: true,
        favorite,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/manage/favorites/{path}",
    tag = "favorites",
    params(("path" = String, Path, description = "File path"), RemoveFavoriteQuery),
    responses(
        (status = 200, description = "File removed from its groups", body = RemoveFavoriteResponse),
        (status = 404, description = "File is not in favorites")
    )
)]
pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<RemoveFavoriteQuery>,
) -> ManageResult<Json<RemoveFavoriteResponse>> {
    let file_id = decode_file_id(&path);
    let removed_groups = state
        .favorite_service()
        .remove_favorite(&file_id, query.group_id.as_deref())
        .await?;
    Ok(Json(RemoveFavoriteResponse {
        success: true,
        removed_count: removed_groups.len(),
        removed_groups,
    }))
}
