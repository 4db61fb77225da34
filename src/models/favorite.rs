use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::search::SortOrder;

pub const DEFAULT_GROUP_ID: &str = "default";
pub const DEFAULT_GROUP_COLOR: &str = "#67C23A";
pub const DEFAULT_GROUP_ICON: &str = "star";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: String,
    pub icon: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub file_count: usize,
}

/// One favorite membership, stored on both the group and the file side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub id: String,
    /// Older file-side entries omit this; the owning key names the file
    #[serde(default)]
    pub file_id: String,
    pub group_id: String,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddFavoriteRequest {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum FavoriteSortBy {
    #[default]
    AddedAt,
    Name,
    Size,
    Time,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct FavoritesQuery {
    pub group_id: Option<String>,
    pub start: Option<usize>,
    pub count: Option<usize>,
    pub sort_by: Option<FavoriteSortBy>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RemoveFavoriteQuery {
    pub group_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupResponse {
    pub success: bool,
    pub group: FavoriteGroup,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupListResponse {
    pub success: bool,
    pub groups: Vec<FavoriteGroup>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FavoriteResponse {
    pub success: bool,
    pub favorite: FavoriteEntry,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFavoriteResponse {
    pub success: bool,
    pub removed_count: usize,
    pub removed_groups: Vec<String>,
}
