use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::metadata::StoreError;
use crate::storage::StorageError;

/// Service-layer error, mapped onto an HTTP status at the route boundary
#[derive(Debug, thiserror::Error)]
pub enum ManageError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Metadata says the file exists but its channel has no bytes for it
    #[error("data integrity error: file {path} is recorded but missing from its storage channel")]
    Integrity { path: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),
}

pub type ManageResult<T> = Result<T, ManageError>;

impl ManageError {
    pub fn validation(message: impl Into<String>) -> Self {
        ManageError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ManageError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ManageError::Conflict(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ManageError::Validation(_) => StatusCode::BAD_REQUEST,
            ManageError::NotFound(_) => StatusCode::NOT_FOUND,
            ManageError::Conflict(_) => StatusCode::CONFLICT,
            ManageError::Integrity { .. }
            | ManageError::Storage(_)
            | ManageError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ManageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({"success": false, "error": self.to_string()}))).into_response()
    }
}
