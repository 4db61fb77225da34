use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::favorite::FavoriteEntry;
use super::file::FileMetadata;

/// Maximum total length of the tags of one tag search
pub const MAX_TAG_QUERY_LENGTH: usize = 2000;
/// Maximum number of tags in one tag search
pub const MAX_TAG_QUERY_ITEMS: usize = 50;

/// Deserializes a comma-separated string into Vec<String>.
///
/// Handles: "a,b,c" -> vec!["a", "b", "c"]
/// - Trims whitespace from each value
/// - Filters empty values
/// - Returns None if the result is empty
///
/// Nothing is dropped here; limits are enforced by the caller so that an
/// oversized list is rejected rather than shortened.
fn deserialize_comma_separated<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let vec: Vec<String> = s
            .split(',')
            .map(|x| x.trim().to_string())
            .filter(|x| !x.is_empty())
            .collect();

        if vec.is_empty() { None } else { Some(vec) }
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Name,
    Size,
    Type,
    #[serde(alias = "time")]
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Free-text search over file names
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TextSearchQuery {
    /// Case-insensitive substring of the file name
    pub q: Option<String>,
    /// image | video | audio | document | other | all
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    /// Directory prefix to restrict the scan to
    pub dir: Option<String>,
    /// Channel name filter (CloudflareR2, S3, Telegram)
    pub channel: Option<String>,
    pub start: Option<usize>,
    pub count: Option<usize>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

/// Files carrying every listed tag
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TagSearchQuery {
    /// Comma-separated tag ids (or tag names)
    #[serde(default, deserialize_with = "deserialize_comma_separated")]
    #[param(value_type = Option<String>)]
    pub tags: Option<Vec<String>>,
    pub dir: Option<String>,
    pub start: Option<usize>,
    pub count: Option<usize>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DirectoryQuery {
    pub dir: Option<String>,
    /// Include files of every nested directory
    pub recursive: Option<bool>,
    pub start: Option<usize>,
    pub count: Option<usize>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

/// One row of a search, listing or favorites response
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Full path; the record key
    pub name: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: Option<f64>,
    pub upload_time: Option<i64>,
    pub directory: String,
    pub channel: String,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<FavoriteEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<FileMetadata>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub files: Vec<FileEntry>,
    pub total: usize,
    pub start: usize,
    /// Number of entries in this page
    pub count: usize,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_query_splits_comma_list() {
        let query: TagSearchQuery =
            serde_json::from_value(serde_json::json!({"tags": " tag_a, ,tag_b ", "sortBy": "time"})).unwrap();
        assert_eq!(query.tags, Some(vec!["tag_a".to_string(), "tag_b".to_string()]));
        assert_eq!(query.sort_by, Some(SortBy::Date));
    }

    #[test]
    fn test_tag_query_keeps_every_item() {
        let list = (0..60).map(|i| format!("tag_{}", i)).collect::<Vec<_>>().join(",");
        let query: TagSearchQuery = serde_json::from_value(serde_json::json!({"tags": list})).unwrap();
        assert_eq!(query.tags.map(|t| t.len()), Some(60));
    }
}
