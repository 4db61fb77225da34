//! Key namespace of the metadata store
//!
//! File records are keyed by their path. Everything else lives under one of
//! the reserved prefixes and must never be surfaced as a file.

pub const MANAGE_PREFIX: &str = "manage@";
pub const FOLDER_PREFIX: &str = "folder:";

/// Prefixes that never name a file record
pub const RESERVED_PREFIXES: [&str; 4] = [MANAGE_PREFIX, FOLDER_PREFIX, "chunk_", "log:"];

pub const TAGS_INDEX: &str = "manage@tags@index";
pub const FAVORITE_GROUPS_INDEX: &str = "manage@favorite_groups@index";
pub const STATS_INDEX: &str = "manage@stats@index";
pub const STORAGE_STATS_CACHE: &str = "manage@storage_stats@cache";

pub const TAG_FILES_PREFIX: &str = "manage@tag_files@";
pub const FILE_TAGS_PREFIX: &str = "manage@file_tags@";
pub const FAVORITE_FILES_PREFIX: &str = "manage@favorite_files@";
pub const FILE_FAVORITES_PREFIX: &str = "manage@file_favorites@";

pub fn is_reserved(key: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

pub fn tag(tag_id: &str) -> String {
    format!("manage@tags@{}", tag_id)
}

pub fn tag_files(tag_id: &str) -> String {
    format!("{}{}", TAG_FILES_PREFIX, tag_id)
}

pub fn file_tags(path: &str) -> String {
    format!("{}{}", FILE_TAGS_PREFIX, path)
}

pub fn favorite_group(group_id: &str) -> String {
    format!("manage@favorite_groups@{}", group_id)
}

pub fn favorite_files(group_id: &str) -> String {
    format!("{}{}", FAVORITE_FILES_PREFIX, group_id)
}

pub fn file_favorites(path: &str) -> String {
    format!("{}{}", FILE_FAVORITES_PREFIX, path)
}

pub fn folder(full_path: &str) -> String {
    format!("{}{}", FOLDER_PREFIX, full_path)
}

pub fn file_stats(path: &str) -> String {
    format!("manage@file_stats@{}", path)
}
