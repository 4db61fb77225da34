use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Synthetic folder record stored under `folder:<fullPath>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub name: String,
    /// Parent path, always ending in `/`
    pub path: String,
    pub full_path: String,
    #[serde(rename = "type", default = "folder_kind")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_permissions")]
    pub permissions: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    /// Always equal to `children.len()`
    #[serde(default)]
    pub item_count: usize,
    #[serde(default)]
    pub children: Vec<FolderChild>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FolderChild {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

pub fn folder_kind() -> String {
    "folder".to_string()
}

pub fn default_permissions() -> String {
    "public".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// One entry of a batch-create request; the parent path comes from the batch
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FolderSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BatchCreateFoldersRequest {
    #[serde(default)]
    pub folders: Vec<FolderSpec>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FolderCreated {
    pub name: String,
    pub path: String,
    pub success: bool,
    pub metadata: Folder,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FolderError {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchFolderSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Percentage, two decimals
    pub success_rate: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchCreateFoldersResult {
    pub results: Vec<FolderCreated>,
    pub errors: Vec<FolderError>,
    pub summary: BatchFolderSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FolderData {
    pub folder: Folder,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FolderResponse {
    pub success: bool,
    pub data: FolderData,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchCreateFoldersResponse {
    pub success: bool,
    pub data: BatchCreateFoldersResult,
}
