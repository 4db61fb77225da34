use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Derived from the tag's member list on every read
    #[serde(default)]
    pub file_count: usize,
}

/// Body of tag create and update requests
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TagRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileTagsRequest {
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TagResponse {
    pub success: bool,
    pub tag: Tag,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TagListResponse {
    pub success: bool,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileTagsResponse {
    pub success: bool,
    pub file_id: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileTagsChangeResponse {
    pub success: bool,
    pub file_id: String,
    /// Tag ids whose association actually changed
    pub changed: Vec<String>,
    pub tags: Vec<Tag>,
}
