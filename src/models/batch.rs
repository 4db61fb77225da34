use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchActionKind {
    Delete,
    Move,
    Copy,
}

impl BatchActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchActionKind::Delete => "delete",
            BatchActionKind::Move => "move",
            BatchActionKind::Copy => "copy",
        }
    }
}

/// Body of `POST /batch`. `action` is kept as a string so that an unknown
/// action is reported as a validation error with a readable message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub target_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchTagsRequest {
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchFavoritesRequest {
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BatchItemError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Relocation {
    pub from: String,
    pub to: String,
}

/// Outcome of one batch, returned with status 200 even when every item failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: bool,
    pub action: String,
    pub total_files: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tags: Option<usize>,
    pub errors: Vec<BatchItemError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub moves: Vec<Relocation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub copies: Vec<Relocation>,
    pub cancelled: bool,
    /// Items never attempted because the batch was cancelled
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchSummaryResponse {
    pub success: bool,
    pub message: String,
    pub results: BatchResult,
}
