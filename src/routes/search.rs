use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::errors::ManageResult;
use crate::models::{DirectoryQuery, SearchResponse, TagSearchQuery, TextSearchQuery};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(text_search))
        .route("/search/tags", get(tag_search))
        .route("/list", get(list_directory))
}

/// Case-insensitive file name search
#[utoipa::path(
    get,
    path = "/api/manage/search",
    tag = "search",
    params(TextSearchQuery),
    responses(
        (status = 200, description = "One page of matching files", body = SearchResponse),
        (status = 400, description = "Missing query or unknown filter")
    )
)]
pub async fn text_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TextSearchQuery>,
) -> ManageResult<Json<SearchResponse>> {
    Ok(Json(state.search_service().text_search(query).await?))
}

/// Files carrying every given tag
#[utoipa::path(
    get,
    path = "/api/manage/search/tags",
    tag = "search",
    params(TagSearchQuery),
    responses(
        (status = 200, description = "One page of tagged files", body = SearchResponse),
        (status = 400, description = "Tags parameter is required")
    )
)]
pub async fn tag_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TagSearchQuery>,
) -> ManageResult<Json<SearchResponse>> {
    Ok(Json(state.search_service().tag_search(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/manage/list",
    tag = "search",
    params(DirectoryQuery),
    responses((status = 200, description = "Files and sub-directories of a directory", body = SearchResponse))
)]
pub async fn list_directory(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DirectoryQuery>,
) -> ManageResult<Json<SearchResponse>> {
    Ok(Json(state.search_service().list_directory(query).await?))
}
