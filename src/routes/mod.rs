use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::errors::ManageError;
use crate::AppState;

pub mod batch;
pub mod favorites;
pub mod files;
pub mod folders;
pub mod search;
pub mod stats;
pub mod tags;

/// JSON body extractor whose rejection uses the common error body
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ManageError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ManageError::validation(rejection.body_text())),
        }
    }
}

/// Management API mounted under `/api/manage`, plus the health check
pub fn api_router() -> Router<Arc<AppState>> {
    let manage = Router::new()
        .merge(batch::router())
        .merge(tags::router())
        .merge(favorites::router())
        .merge(folders::router())
        .merge(search::router())
        .merge(files::router())
        .merge(stats::router());

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/manage", manage)
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
