use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::routes;

/// OpenAPI document of the management API. Schemas are collected from the
/// request and response bodies named in each path.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "imghub management API",
        description = "Batch operations, tags, favorites, folders, search and statistics over hosted files"
    ),
    paths(
        routes::health_check,
        routes::batch::run_batch,
        routes::batch::batch_add_tags,
        routes::batch::batch_add_favorites,
        routes::tags::list_tags,
        routes::tags::create_tag,
        routes::tags::update_tag,
        routes::tags::delete_tag,
        routes::tags::get_file_tags,
        routes::tags::add_file_tags,
        routes::tags::remove_file_tags,
        routes::favorites::list_groups,
        routes::favorites::create_group,
        routes::favorites::delete_group,
        routes::favorites::list_favorites,
        routes::favorites::add_favorite,
        routes::favorites::remove_favorite,
        routes::folders::create_folder,
        routes::folders::batch_create_folders,
        routes::folders::get_folder,
        routes::search::text_search,
        routes::search::tag_search,
        routes::search::list_directory,
        routes::files::get_file,
        routes::files::rename_file,
        routes::stats::record_access,
        routes::stats::file_stats,
        routes::stats::storage_usage,
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "batch", description = "Many files, one action"),
        (name = "tags", description = "Tags and file tag assignments"),
        (name = "favorites", description = "Favorite groups and their members"),
        (name = "folders", description = "Folder records"),
        (name = "search", description = "Search, tag search and directory listing"),
        (name = "files", description = "File content and rename"),
        (name = "stats", description = "Access and storage statistics")
    )
)]
pub struct ApiDoc;

/// Swagger UI at `/swagger-ui`, document at `/api-docs/openapi.json`
pub fn swagger_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
