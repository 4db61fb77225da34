use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::{ManageError, ManageResult};
use crate::metadata::{keys, MetadataStore, MetadataStoreExt};
use crate::models::{
    basename, parent_dir, Channel, DirectoryQuery, FileEntry, FileKind, FileRecord,
    SearchResponse, SortBy, SortOrder, TagSearchQuery, TextSearchQuery, MAX_TAG_QUERY_ITEMS,
    MAX_TAG_QUERY_LENGTH,
};
use crate::services::file_service::FileService;
use crate::services::tag_service::TagService;

/// One slice of a materialized, sorted result set
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub start: usize,
    pub has_more: bool,
}

/// `[start, start + count)` of `items`. `has_more` compares against the
/// requested count, not the returned one.
pub fn paginate<T>(items: Vec<T>, start: usize, count: usize) -> Page<T> {
    let total = items.len();
    let has_more = start.saturating_add(count) < total;
    let items = items.into_iter().skip(start).take(count).collect();
    Page {
        items,
        total,
        start,
        has_more,
    }
}

impl Page<FileEntry> {
    pub fn into_response(self) -> SearchResponse {
        SearchResponse {
            success: true,
            count: self.items.len(),
            files: self.items,
            total: self.total,
            start: self.start,
            has_more: self.has_more,
            directories: None,
            tags: None,
        }
    }
}

pub fn file_entry(record: &FileRecord) -> FileEntry {
    let metadata = &record.metadata;
    FileEntry {
        name: record.path.clone(),
        file_name: metadata
            .file_name
            .clone()
            .unwrap_or_else(|| record.path.clone()),
        file_type: metadata.file_type.clone().unwrap_or_default(),
        file_size: metadata.file_size(),
        upload_time: metadata.timestamp,
        directory: metadata
            .directory
            .clone()
            .unwrap_or_else(|| parent_dir(&record.path).to_string()),
        channel: metadata.channel_label().to_string(),
        is_directory: false,
        tags: None,
        favorite: None,
        metadata: Some(metadata.clone()),
    }
}

fn directory_entry(path: &str) -> FileEntry {
    FileEntry {
        name: path.to_string(),
        file_name: basename(path).to_string(),
        file_type: "folder".to_string(),
        file_size: None,
        upload_time: None,
        directory: parent_dir(path).to_string(),
        channel: String::new(),
        is_directory: true,
        tags: None,
        favorite: None,
        metadata: None,
    }
}

fn compare(a: &FileEntry, b: &FileEntry, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::Name => a.file_name.to_lowercase().cmp(&b.file_name.to_lowercase()),
        SortBy::Size => a
            .file_size
            .unwrap_or(0.0)
            .partial_cmp(&b.file_size.unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        SortBy::Type => a.file_type.to_lowercase().cmp(&b.file_type.to_lowercase()),
        SortBy::Date => a.upload_time.unwrap_or(0).cmp(&b.upload_time.unwrap_or(0)),
    }
}

/// Stable sort by key, then a second stable pass that moves directories first
pub fn sort_entries(entries: &mut [FileEntry], sort_by: SortBy, sort_order: SortOrder) {
    entries.sort_by(|a, b| match sort_order {
        SortOrder::Asc => compare(a, b, sort_by),
        SortOrder::Desc => compare(a, b, sort_by).reverse(),
    });
    entries.sort_by_key(|e| !e.is_directory);
}

fn normalize_dir(dir: Option<&str>) -> String {
    dir.unwrap_or_default().trim().trim_matches('/').to_string()
}

fn dir_prefix(dir: &str) -> String {
    if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    }
}

fn in_dir(path: &str, dir: &str) -> bool {
    dir.is_empty() || path == dir || path.starts_with(&dir_prefix(dir))
}

/// Free-text, tag and directory queries over the metadata store
#[derive(Clone)]
pub struct SearchService {
    store: Arc<dyn MetadataStore>,
    files: FileService,
    tags: TagService,
    default_page_size: usize,
}

impl SearchService {
    pub fn new(store: Arc<dyn MetadataStore>, files: FileService, tags: TagService, default_page_size: usize) -> Self {
        Self {
            store,
            files,
            tags,
            default_page_size,
        }
    }

    pub async fn text_search(&self, query: TextSearchQuery) -> ManageResult<SearchResponse> {
        let needle = query.q.as_deref().unwrap_or_default().trim().to_lowercase();
        if needle.is_empty() {
            return Err(ManageError::validation("Search query is required"));
        }
        let kind = match query.file_type.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(other) => Some(
                FileKind::parse(other)
                    .ok_or_else(|| ManageError::validation(format!("Unknown file type '{}'", other)))?,
            ),
        };
        let channel = match query.channel.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(other) => Some(
                Channel::parse(other)
                    .ok_or_else(|| ManageError::validation(format!("Unknown channel '{}'", other)))?,
            ),
        };
        let dir = normalize_dir(query.dir.as_deref());

        let mut directories = BTreeSet::new();
        let mut matches = Vec::new();
        for record in self.files.scan(&dir_prefix(&dir)).await? {
            let segments: Vec<&str> = record.path.split('/').collect();
            for depth in 1..segments.len() {
                directories.insert(format!("{}/", segments[..depth].join("/")));
            }

            if record.metadata.timestamp.is_none() {
                continue;
            }
            let entry = file_entry(&record);
            if !entry.file_name.to_lowercase().contains(&needle) {
                continue;
            }
            if kind.is_some_and(|k| FileKind::of(&entry.file_name) != k) {
                continue;
            }
            if channel.is_some_and(|c| record.metadata.channel() != c) {
                continue;
            }
            matches.push(entry);
        }

        sort_entries(
            &mut matches,
            query.sort_by.unwrap_or_default(),
            query.sort_order.unwrap_or_default(),
        );
        let start = query.start.unwrap_or(0);
        let count = query.count.unwrap_or(self.default_page_size);
        debug!("Text search '{}' matched {} files", needle, matches.len());

        let mut response = paginate(matches, start, count).into_response();
        response.directories = Some(directories.into_iter().collect());
        Ok(response)
    }

    /// Files of a tag, or the intersection of several
    async fn tagged_paths(&self, tag_ids: &[String]) -> ManageResult<Vec<String>> {
        let Some((first, rest)) = tag_ids.split_first() else {
            return Ok(Vec::new());
        };
        let mut paths = self.tags.tag_members(first).await?;
        for tag_id in rest {
            if paths.is_empty() {
                break;
            }
            let members: HashSet<String> = self.tags.tag_members(tag_id).await?.into_iter().collect();
            paths.retain(|p| members.contains(p));
        }
        Ok(paths)
    }

    pub async fn tag_search(&self, query: TagSearchQuery) -> ManageResult<SearchResponse> {
        let references = query
            .tags
            .ok_or_else(|| ManageError::validation("Tags parameter is required"))?;
        if references.len() > MAX_TAG_QUERY_ITEMS {
            return Err(ManageError::validation(format!(
                "Too many tags: at most {} can be searched at once",
                MAX_TAG_QUERY_ITEMS
            )));
        }
        if references.iter().map(String::len).sum::<usize>() > MAX_TAG_QUERY_LENGTH {
            return Err(ManageError::validation("Tags parameter is too long"));
        }

        let mut tag_ids = Vec::new();
        let mut unresolved = false;
        for reference in &references {
            match self.tags.resolve_tag_ref(reference).await? {
                Some(tag_id) => tag_ids.push(tag_id),
                None => {
                    debug!("Tag '{}' does not exist; search matches nothing", reference);
                    unresolved = true;
                }
            }
        }

        let dir = normalize_dir(query.dir.as_deref());
        let paths = if unresolved {
            Vec::new()
        } else {
            self.tagged_paths(&tag_ids).await?
        };

        let mut matches = Vec::new();
        for path in paths.into_iter().filter(|p| in_dir(p, &dir)) {
            match self.files.get_record(&path).await? {
                Some(record) => {
                    let mut entry = file_entry(&record);
                    entry.tags = Some(self.tags.file_tag_ids(&path).await?);
                    matches.push(entry);
                }
                None => warn!("Tag index lists missing file {}", path),
            }
        }

        sort_entries(
            &mut matches,
            query.sort_by.unwrap_or_default(),
            query.sort_order.unwrap_or_default(),
        );
        let start = query.start.unwrap_or(0);
        let count = query.count.unwrap_or(self.default_page_size);

        let mut response = paginate(matches, start, count).into_response();
        response.tags = Some(tag_ids);
        Ok(response)
    }

    /// Immediate children of a directory: files plus sub-directories seen in
    /// file paths or created as folders
    pub async fn list_directory(&self, query: DirectoryQuery) -> ManageResult<SearchResponse> {
        let dir = normalize_dir(query.dir.as_deref());
        let prefix = dir_prefix(&dir);
        let recursive = query.recursive.unwrap_or(false);

        let mut directories = BTreeSet::new();
        let mut entries = Vec::new();
        for record in self.files.scan(&prefix).await? {
            let relative = &record.path[prefix.len()..];
            match relative.split_once('/') {
                Some((child, _)) => {
                    directories.insert(format!("{}{}", prefix, child));
                    if recursive {
                        entries.push(file_entry(&record));
                    }
                }
                None => entries.push(file_entry(&record)),
            }
        }

        for key in self.store.list_all(keys::FOLDER_PREFIX).await? {
            let full_path = key.name[keys::FOLDER_PREFIX.len()..].trim_matches('/');
            if !full_path.is_empty() && parent_dir(full_path) == dir {
                directories.insert(full_path.to_string());
            }
        }

        entries.extend(directories.iter().map(|d| directory_entry(d)));
        sort_entries(
            &mut entries,
            query.sort_by.unwrap_or_default(),
            query.sort_order.unwrap_or_default(),
        );
        let start = query.start.unwrap_or(0);
        let count = query.count.unwrap_or(self.default_page_size);

        let mut response = paginate(entries, start, count).into_response();
        response.directories = Some(directories.into_iter().collect());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use crate::models::TagRequest;
    use crate::storage::ChannelRegistry;
    use serde_json::json;

    async fn service() -> (SearchService, TagService, Arc<dyn MetadataStore>) {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let seed = [
            ("trip/beach.jpg", "CloudflareR2", 2.5, 300),
            ("trip/notes.txt", "S3", 0.1, 100),
            ("trip/day2/sunset.png", "Telegram", 4.0, 200),
            ("cat.gif", "CloudflareR2", 1.0, 400),
        ];
        for (path, channel, size, ts) in seed {
            store
                .put(
                    path,
                    "",
                    Some(&json!({"FileName": path, "FileSize": size.to_string(), "TimeStamp": ts, "Channel": channel})),
                )
                .await
                .unwrap();
        }
        store.put("manage@tags@index", "{\"tags\":[]}", None).await.unwrap();
        store.put("folder:/trip/empty", "{}", None).await.unwrap();

        let files = FileService::new(store.clone(), Arc::new(ChannelRegistry::new()));
        let tags = TagService::new(store.clone(), files.clone());
        (SearchService::new(store.clone(), files, tags.clone(), 50), tags, store)
    }

    fn names(response: &SearchResponse) -> Vec<&str> {
        response.files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_paginate_bounds() {
        let items: Vec<usize> = (0..5).collect();
        let page = paginate(items.clone(), 3, 10);
        assert_eq!(page.items, vec![3, 4]);
        assert!(!page.has_more);

        let page = paginate(items.clone(), 0, 2);
        assert_eq!(page.items, vec![0, 1]);
        assert!(page.has_more);

        let page = paginate(items, 9, 2);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);
    }

    #[test]
    fn test_pages_concatenate_to_full_set() {
        let items: Vec<usize> = (0..7).collect();
        let mut seen = Vec::new();
        let mut start = 0;
        loop {
            let page = paginate(items.clone(), start, 3);
            seen.extend(page.items);
            if !page.has_more {
                break;
            }
            start += 3;
        }
        assert_eq!(seen, items);
    }

    #[tokio::test]
    async fn test_text_search_filters_and_sorts() {
        let (service, _, _) = service().await;
        let response = service
            .text_search(TextSearchQuery {
                q: Some("T".into()),
                sort_by: Some(SortBy::Size),
                sort_order: Some(SortOrder::Desc),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            names(&response),
            vec!["trip/day2/sunset.png", "trip/beach.jpg", "cat.gif", "trip/notes.txt"]
        );
        assert_eq!(
            response.directories,
            Some(vec!["trip/".to_string(), "trip/day2/".to_string()])
        );

        let images = service
            .text_search(TextSearchQuery {
                q: Some("trip".into()),
                file_type: Some("image".into()),
                channel: Some("telegram".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&images), vec!["trip/day2/sunset.png"]);
    }

    #[tokio::test]
    async fn test_text_search_requires_query() {
        let (service, _, _) = service().await;
        let err = service.text_search(TextSearchQuery::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Search query is required");
    }

    #[tokio::test]
    async fn test_tag_intersection() {
        let (service, tags, _) = service().await;
        let a = tags
            .create_tag(TagRequest { name: "A".into(), color: "#1".into(), description: None })
            .await
            .unwrap();
        let b = tags
            .create_tag(TagRequest { name: "B".into(), color: "#2".into(), description: None })
            .await
            .unwrap();
        tags.tag_file("trip/beach.jpg", &[a.id.clone(), b.id.clone()]).await.unwrap();
        tags.tag_file("cat.gif", &[a.id.clone()]).await.unwrap();

        let both = service
            .tag_search(TagSearchQuery {
                tags: Some(vec![a.id.clone(), "b".into()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&both), vec!["trip/beach.jpg"]);
        assert_eq!(both.files[0].tags.as_ref().map(Vec::len), Some(2));

        let in_trip = service
            .tag_search(TagSearchQuery {
                tags: Some(vec![a.id.clone()]),
                dir: Some("trip".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(in_trip.total, 1);

        let unknown = service
            .tag_search(TagSearchQuery {
                tags: Some(vec![a.id.clone(), "tag_missing".into()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unknown.total, 0);
    }

    #[tokio::test]
    async fn test_directory_listing_puts_directories_first() {
        let (service, _, _) = service().await;
        let response = service
            .list_directory(DirectoryQuery {
                dir: Some("/trip/".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            names(&response),
            vec!["trip/day2", "trip/empty", "trip/beach.jpg", "trip/notes.txt"]
        );

        let recursive = service
            .list_directory(DirectoryQuery {
                dir: Some("trip".into()),
                recursive: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recursive.total, 5);
    }

    #[test]
    fn test_directory_sort_is_stable() {
        let mut entries = vec![
            directory_entry("b"),
            FileEntry { is_directory: false, ..directory_entry("a.jpg") },
            directory_entry("a"),
        ];
        sort_entries(&mut entries, SortBy::Name, SortOrder::Desc);
        let order: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "a.jpg"]);
    }
}
