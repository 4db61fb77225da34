//! Versioned blobs backing the secondary indices
//!
//! Blobs written before versioning was introduced have no `version` field and
//! read as version 1. Required list fields have no default: a blob missing
//! its list is corrupt, not empty.

use serde::{Deserialize, Serialize};

use super::favorite::FavoriteEntry;
use super::stats::AccessLog;
use crate::metadata::{VersionedRecord, RECORD_VERSION};

fn record_version() -> u32 {
    RECORD_VERSION
}

/// `{tags: [tagId...]}`: the tag index and each file's tag list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagIdList {
    #[serde(default = "record_version")]
    pub version: u32,
    pub tags: Vec<String>,
}

/// `{files: [path...]}`: each tag's member list and the stats index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileList {
    #[serde(default = "record_version")]
    pub version: u32,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupIdList {
    #[serde(default = "record_version")]
    pub version: u32,
    pub groups: Vec<String>,
}

/// A favorite group's member list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntryList {
    #[serde(default = "record_version")]
    pub version: u32,
    pub files: Vec<FavoriteEntry>,
}

/// A file's favorite memberships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFavoriteList {
    #[serde(default = "record_version")]
    pub version: u32,
    pub favorites: Vec<FavoriteEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogList {
    #[serde(default = "record_version")]
    pub version: u32,
    pub access_logs: Vec<AccessLog>,
}

macro_rules! versioned_list {
    ($($ty:ident { $field:ident : $item:ty }),* $(,)?) => {
        $(
            impl VersionedRecord for $ty {
                fn version(&self) -> u32 {
                    self.version
                }
            }

            impl Default for $ty {
                fn default() -> Self {
                    Self { version: RECORD_VERSION, $field: Vec::new() }
                }
            }

            impl $ty {
                pub fn new($field: Vec<$item>) -> Self {
                    Self { version: RECORD_VERSION, $field }
                }
            }
        )*
    };
}

versioned_list!(
    TagIdList { tags: String },
    FileList { files: String },
    GroupIdList { groups: String },
    FavoriteEntryList { files: FavoriteEntry },
    FileFavoriteList { favorites: FavoriteEntry },
    AccessLogList { access_logs: AccessLog },
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unversioned_blob_reads_as_v1() {
        let list: TagIdList = serde_json::from_value(json!({"tags": ["tag_a"]})).unwrap();
        assert_eq!(list.version, 1);
        assert_eq!(list.tags, vec!["tag_a"]);
    }

    #[test]
    fn test_missing_list_is_an_error() {
        assert!(serde_json::from_value::<FileList>(json!({})).is_err());
        assert!(serde_json::from_value::<FileList>(json!({"files": "a.jpg"})).is_err());
    }

    #[test]
    fn test_new_sets_current_version() {
        let list = FileList::new(vec!["a.jpg".into()]);
        assert_eq!(serde_json::to_value(&list).unwrap(), json!({"version": 1, "files": ["a.jpg"]}));
    }
}
