//! Bidirectional secondary indices
//!
//! Tag and favorite memberships are stored twice: once under the owner (tag or
//! group) and once under the file. The store only offers single-key atomicity,
//! so every mutation here is a sequence of independent writes. The owner side
//! is written first and is the one `reconcile_indices` trusts.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metadata::{keys, MetadataStore, MetadataStoreExt, StoreResult};
use crate::models::index::{FavoriteEntryList, FileFavoriteList, FileList, TagIdList};
use crate::models::{generate_id, FavoriteEntry, Relocation};

/// One owner-to-file relation kept in both directions
#[async_trait]
pub trait AssociationIndex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns false when the file already belonged to the owner
    async fn add_association(&self, owner: &str, member: &str) -> StoreResult<bool>;

    /// Returns false when there was nothing to remove
    async fn remove_association(&self, owner: &str, member: &str) -> StoreResult<bool>;

    async fn list_members(&self, owner: &str) -> StoreResult<Vec<String>>;

    async fn list_owners(&self, member: &str) -> StoreResult<Vec<String>>;

    /// Drop an owner and every back-reference to it
    async fn purge_owner(&self, owner: &str) -> StoreResult<usize>;

    /// Drop a file from every owner it belongs to
    async fn purge_member(&self, member: &str) -> StoreResult<usize>;

    /// Carry a file's memberships over to its new path
    async fn rekey_member(&self, old: &str, new: &str) -> StoreResult<usize>;
}

/// `manage@tag_files@{tag}` <-> `manage@file_tags@{path}`
#[derive(Clone)]
pub struct TagIndex {
    store: Arc<dyn MetadataStore>,
}

impl TagIndex {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    async fn tag_files(&self, tag_id: &str) -> StoreResult<FileList> {
        Ok(self
            .store
            .get_record(&keys::tag_files(tag_id))
            .await?
            .unwrap_or_default())
    }

    /// A tag's member list is kept even when empty
    async fn write_tag_files(&self, tag_id: &str, list: &FileList) -> StoreResult<()> {
        self.store.put_json(&keys::tag_files(tag_id), list).await
    }

    async fn file_tags(&self, path: &str) -> StoreResult<TagIdList> {
        Ok(self
            .store
            .get_record(&keys::file_tags(path))
            .await?
            .unwrap_or_default())
    }

    async fn write_file_tags(&self, path: &str, list: &TagIdList) -> StoreResult<()> {
        if list.tags.is_empty() {
            self.store.delete(&keys::file_tags(path)).await
        } else {
            self.store.put_json(&keys::file_tags(path), list).await
        }
    }

    /// Create the empty member list of a new tag
    pub async fn init_owner(&self, tag_id: &str) -> StoreResult<()> {
        self.write_tag_files(tag_id, &FileList::default()).await
    }
}

#[async_trait]
impl AssociationIndex for TagIndex {
    fn name(&self) -> &'static str {
        "tags"
    }

    async fn add_association(&self, tag_id: &str, path: &str) -> StoreResult<bool> {
        let mut members = self.tag_files(tag_id).await?;
        if !members.files.iter().any(|f| f == path) {
            members.files.push(path.to_string());
            self.write_tag_files(tag_id, &members).await?;
        }

        let mut owners = self.file_tags(path).await?;
        if owners.tags.iter().any(|t| t == tag_id) {
            return Ok(false);
        }
        owners.tags.push(tag_id.to_string());
        self.write_file_tags(path, &owners).await?;
        Ok(true)
    }

    async fn remove_association(&self, tag_id: &str, path: &str) -> StoreResult<bool> {
        let mut members = self.tag_files(tag_id).await?;
        let before = members.files.len();
        members.files.retain(|f| f != path);
        let owner_changed = members.files.len() != before;
        if owner_changed {
            self.write_tag_files(tag_id, &members).await?;
        }

        let mut owners = self.file_tags(path).await?;
        let before = owners.tags.len();
        owners.tags.retain(|t| t != tag_id);
        let member_changed = owners.tags.len() != before;
        if member_changed {
            self.write_file_tags(path, &owners).await?;
        }

        Ok(owner_changed || member_changed)
    }

    async fn list_members(&self, tag_id: &str) -> StoreResult<Vec<String>> {
        Ok(self.tag_files(tag_id).await?.files)
    }

    async fn list_owners(&self, path: &str) -> StoreResult<Vec<String>> {
        Ok(self.file_tags(path).await?.tags)
    }

    async fn purge_owner(&self, tag_id: &str) -> StoreResult<usize> {
        let members = self.list_members(tag_id).await?;
        let mut cleaned = 0;
        for path in &members {
            let result = async {
                let mut owners = self.file_tags(path).await?;
                owners.tags.retain(|t| t != tag_id);
                self.write_file_tags(path, &owners).await
            }
            .await;
            match result {
                Ok(()) => cleaned += 1,
                Err(e) => error!("Failed to remove tag {} from file {}: {}", tag_id, path, e),
            }
        }
        self.store.delete(&keys::tag_files(tag_id)).await?;
        Ok(cleaned)
    }

    async fn purge_member(&self, path: &str) -> StoreResult<usize> {
        let owners = self.list_owners(path).await?;
        let mut cleaned = 0;
        for tag_id in &owners {
            let result = async {
                let mut members = self.tag_files(tag_id).await?;
                members.files.retain(|f| f != path);
                self.write_tag_files(tag_id, &members).await
            }
            .await;
            match result {
                Ok(()) => cleaned += 1,
                Err(e) => error!("Failed to remove file {} from tag {}: {}", path, tag_id, e),
            }
        }
        self.store.delete(&keys::file_tags(path)).await?;
        Ok(cleaned)
    }

    async fn rekey_member(&self, old: &str, new: &str) -> StoreResult<usize> {
        let owners = self.list_owners(old).await?;
        if owners.is_empty() {
            return Ok(0);
        }
        for tag_id in &owners {
            let mut members = self.tag_files(tag_id).await?;
            members.files.retain(|f| f != old);
            if !members.files.iter().any(|f| f == new) {
                members.files.push(new.to_string());
            }
            self.write_tag_files(tag_id, &members).await?;
        }

        let mut merged = self.file_tags(new).await?;
        for tag_id in &owners {
            if !merged.tags.contains(tag_id) {
                merged.tags.push(tag_id.clone());
            }
        }
        self.write_file_tags(new, &merged).await?;
        self.store.delete(&keys::file_tags(old)).await?;
        Ok(owners.len())
    }
}

/// Outcome of putting a file into a favorite group
#[derive(Debug, Clone, PartialEq)]
pub enum FavoriteAdd {
    Added(FavoriteEntry),
    AlreadyPresent(FavoriteEntry),
}

/// `manage@favorite_files@{group}` <-> `manage@file_favorites@{path}`
#[derive(Clone)]
pub struct FavoriteIndex {
    store: Arc<dyn MetadataStore>,
}

impl FavoriteIndex {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    async fn group_files(&self, group_id: &str) -> StoreResult<FavoriteEntryList> {
        Ok(self
            .store
            .get_record(&keys::favorite_files(group_id))
            .await?
            .unwrap_or_default())
    }

    async fn write_group_files(&self, group_id: &str, list: &FavoriteEntryList) -> StoreResult<()> {
        self.store.put_json(&keys::favorite_files(group_id), list).await
    }

    async fn file_favorites(&self, path: &str) -> StoreResult<FileFavoriteList> {
        Ok(self
            .store
            .get_record(&keys::file_favorites(path))
            .await?
            .unwrap_or_default())
    }

    async fn write_file_favorites(&self, path: &str, list: &FileFavoriteList) -> StoreResult<()> {
        if list.favorites.is_empty() {
            self.store.delete(&keys::file_favorites(path)).await
        } else {
            self.store.put_json(&keys::file_favorites(path), list).await
        }
    }

    pub async fn init_owner(&self, group_id: &str) -> StoreResult<()> {
        self.write_group_files(group_id, &FavoriteEntryList::default()).await
    }

    /// Entries of a group, in insertion order
    pub async fn entries(&self, group_id: &str) -> StoreResult<Vec<FavoriteEntry>> {
        Ok(self.group_files(group_id).await?.files)
    }

    /// Entries of a file across all groups
    pub async fn file_entries(&self, path: &str) -> StoreResult<Vec<FavoriteEntry>> {
        let mut favorites = self.file_favorites(path).await?.favorites;
        for entry in favorites.iter_mut().filter(|e| e.file_id.is_empty()) {
            entry.file_id = path.to_string();
        }
        Ok(favorites)
    }

    pub async fn add_favorite(&self, group_id: &str, path: &str, note: &str) -> StoreResult<FavoriteAdd> {
        let mut members = self.group_files(group_id).await?;
        let mut owners = self.file_favorites(path).await?;

        if let Some(existing) = members.files.iter().find(|e| e.file_id == path).cloned() {
            if !owners.favorites.iter().any(|e| e.group_id == group_id) {
                owners.favorites.push(existing.clone());
                self.write_file_favorites(path, &owners).await?;
            }
            return Ok(FavoriteAdd::AlreadyPresent(existing));
        }

        let entry = FavoriteEntry {
            id: generate_id("fav"),
            file_id: path.to_string(),
            group_id: group_id.to_string(),
            added_at: Utc::now(),
            note: note.to_string(),
        };
        members.files.push(entry.clone());
        self.write_group_files(group_id, &members).await?;

        owners.favorites.retain(|e| e.group_id != group_id);
        owners.favorites.push(entry.clone());
        self.write_file_favorites(path, &owners).await?;
        Ok(FavoriteAdd::Added(entry))
    }
}

#[async_trait]
impl AssociationIndex for FavoriteIndex {
    fn name(&self) -> &'static str {
        "favorites"
    }

    async fn add_association(&self, group_id: &str, path: &str) -> StoreResult<bool> {
        Ok(matches!(
            self.add_favorite(group_id, path, "").await?,
            FavoriteAdd::Added(_)
        ))
    }

    async fn remove_association(&self, group_id: &str, path: &str) -> StoreResult<bool> {
        let mut members = self.group_files(group_id).await?;
        let before = members.files.len();
        members.files.retain(|e| e.file_id != path);
        let owner_changed = members.files.len() != before;
        if owner_changed {
            self.write_group_files(group_id, &members).await?;
        }

        let mut owners = self.file_favorites(path).await?;
        let before = owners.favorites.len();
        owners.favorites.retain(|e| e.group_id != group_id);
        let member_changed = owners.favorites.len() != before;
        if member_changed {
            self.write_file_favorites(path, &owners).await?;
        }

        Ok(owner_changed || member_changed)
    }

    async fn list_members(&self, group_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .entries(group_id)
            .await?
            .into_iter()
            .map(|e| e.file_id)
            .collect())
    }

    async fn list_owners(&self, path: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .file_favorites(path)
            .await?
            .favorites
            .into_iter()
            .map(|e| e.group_id)
            .collect())
    }

    async fn purge_owner(&self, group_id: &str) -> StoreResult<usize> {
        let members = self.list_members(group_id).await?;
        let mut cleaned = 0;
        for path in &members {
            let result = async {
                let mut owners = self.file_favorites(path).await?;
                owners.favorites.retain(|e| e.group_id != group_id);
                self.write_file_favorites(path, &owners).await
            }
            .await;
            match result {
                Ok(()) => cleaned += 1,
                Err(e) => error!("Failed to remove group {} from file {}: {}", group_id, path, e),
            }
        }
        self.store.delete(&keys::favorite_files(group_id)).await?;
        Ok(cleaned)
    }

    async fn purge_member(&self, path: &str) -> StoreResult<usize> {
        let owners = self.list_owners(path).await?;
        let mut cleaned = 0;
        for group_id in &owners {
            let result = async {
                let mut members = self.group_files(group_id).await?;
                members.files.retain(|e| e.file_id != path);
                self.write_group_files(group_id, &members).await
            }
            .await;
            match result {
                Ok(()) => cleaned += 1,
                Err(e) => error!("Failed to remove file {} from group {}: {}", path, group_id, e),
            }
        }
        self.store.delete(&keys::file_favorites(path)).await?;
        Ok(cleaned)
    }

    async fn rekey_member(&self, old: &str, new: &str) -> StoreResult<usize> {
        let entries = self.file_entries(old).await?;
        if entries.is_empty() {
            return Ok(0);
        }
        for entry in &entries {
            let mut members = self.group_files(&entry.group_id).await?;
            let already_there = members.files.iter().any(|e| e.file_id == new);
            if already_there {
                members.files.retain(|e| e.file_id != old);
            } else {
                for e in members.files.iter_mut().filter(|e| e.file_id == old) {
                    e.file_id = new.to_string();
                }
            }
            self.write_group_files(&entry.group_id, &members).await?;
        }

        let mut merged = self.file_favorites(new).await?;
        for mut entry in entries.iter().cloned() {
            if !merged.favorites.iter().any(|e| e.group_id == entry.group_id) {
                entry.file_id = new.to_string();
                merged.favorites.push(entry);
            }
        }
        self.write_file_favorites(new, &merged).await?;
        self.store.delete(&keys::file_favorites(old)).await?;
        Ok(entries.len())
    }
}

/// Index work owed after files were deleted or moved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFollowup {
    pub removed: Vec<String>,
    pub moved: Vec<Relocation>,
}

impl IndexFollowup {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.moved.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowupReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Every secondary index that refers to files by path
#[derive(Clone)]
pub struct IndexManager {
    store: Arc<dyn MetadataStore>,
    tags: TagIndex,
    favorites: FavoriteIndex,
}

impl IndexManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            tags: TagIndex::new(store.clone()),
            favorites: FavoriteIndex::new(store.clone()),
            store,
        }
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn favorites(&self) -> &FavoriteIndex {
        &self.favorites
    }

    fn associations(&self) -> [&dyn AssociationIndex; 2] {
        [&self.tags, &self.favorites]
    }

    async fn stats_index(&self) -> StoreResult<FileList> {
        Ok(self
            .store
            .get_record(keys::STATS_INDEX)
            .await?
            .unwrap_or_default())
    }

    /// Add a file to the list of files with access logs
    pub async fn track_stats(&self, path: &str) -> StoreResult<()> {
        let mut index = self.stats_index().await?;
        if !index.files.iter().any(|f| f == path) {
            index.files.push(path.to_string());
            self.store.put_json(keys::STATS_INDEX, &index).await?;
        }
        Ok(())
    }

    async fn forget_stats(&self, path: &str) -> StoreResult<()> {
        self.store.delete(&keys::file_stats(path)).await?;
        let mut index = self.stats_index().await?;
        let before = index.files.len();
        index.files.retain(|f| f != path);
        if index.files.len() != before {
            self.store.put_json(keys::STATS_INDEX, &index).await?;
        }
        Ok(())
    }

    async fn rekey_stats(&self, old: &str, new: &str) -> StoreResult<()> {
        let Some(entry) = self.store.get(&keys::file_stats(old)).await? else {
            return Ok(());
        };
        self.store
            .put(&keys::file_stats(new), &entry.value, entry.metadata.as_ref())
            .await?;
        self.store.delete(&keys::file_stats(old)).await?;

        let mut index = self.stats_index().await?;
        index.files.retain(|f| f != old && f != new);
        index.files.push(new.to_string());
        self.store.put_json(keys::STATS_INDEX, &index).await
    }

    /// Remove a deleted file from every index. Returns the number of indices
    /// that could not be cleaned.
    pub async fn forget_file(&self, path: &str) -> usize {
        let mut failures = 0;
        for index in self.associations() {
            match index.purge_member(path).await {
                Ok(n) if n > 0 => debug!("Removed {} from {} {}", path, n, index.name()),
                Ok(_) => {}
                Err(e) => {
                    failures += 1;
                    error!("Failed to clean {} index for deleted file {}: {}", index.name(), path, e);
                }
            }
        }
        if let Err(e) = self.forget_stats(path).await {
            failures += 1;
            error!("Failed to clean access stats for deleted file {}: {}", path, e);
        }
        failures
    }

    /// Point every index entry for `old` at `new`
    pub async fn rekey_file(&self, old: &str, new: &str) -> usize {
        let mut failures = 0;
        for index in self.associations() {
            if let Err(e) = index.rekey_member(old, new).await {
                failures += 1;
                error!("Failed to move {} index entries {} -> {}: {}", index.name(), old, new, e);
            }
        }
        if let Err(e) = self.rekey_stats(old, new).await {
            failures += 1;
            error!("Failed to move access stats {} -> {}: {}", old, new, e);
        }
        failures
    }

    pub async fn apply(&self, followup: &IndexFollowup) -> FollowupReport {
        let mut report = FollowupReport::default();
        for path in &followup.removed {
            if self.forget_file(path).await == 0 {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        for relocation in &followup.moved {
            if self.rekey_file(&relocation.from, &relocation.to).await == 0 {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        if report.failed > 0 {
            warn!(
                "Index follow-up finished with {} failures; run reconcile_indices to repair",
                report.failed
            );
        } else {
            info!("Index follow-up updated {} files", report.succeeded);
        }
        report
    }

    /// Run the follow-up after the response has been sent
    pub fn spawn_followup(&self, followup: IndexFollowup) -> Option<JoinHandle<FollowupReport>> {
        if followup.is_empty() {
            return None;
        }
        let manager = self.clone();
        Some(tokio::spawn(async move { manager.apply(&followup).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use crate::models::{AccessLog, AccessType};
    use crate::models::index::AccessLogList;

    fn manager() -> (IndexManager, Arc<MemoryMetadataStore>) {
        let store = Arc::new(MemoryMetadataStore::new());
        (IndexManager::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_tag_association_is_symmetric() {
        let (manager, _) = manager();
        let tags = manager.tags();

        assert!(tags.add_association("tag_a", "x.jpg").await.unwrap());
        assert!(!tags.add_association("tag_a", "x.jpg").await.unwrap());
        tags.add_association("tag_b", "x.jpg").await.unwrap();

        assert_eq!(tags.list_members("tag_a").await.unwrap(), vec!["x.jpg"]);
        assert_eq!(tags.list_owners("x.jpg").await.unwrap(), vec!["tag_a", "tag_b"]);

        assert!(tags.remove_association("tag_a", "x.jpg").await.unwrap());
        assert!(!tags.remove_association("tag_a", "x.jpg").await.unwrap());
        assert!(tags.list_members("tag_a").await.unwrap().is_empty());
        assert_eq!(tags.list_owners("x.jpg").await.unwrap(), vec!["tag_b"]);
    }

    #[tokio::test]
    async fn test_empty_file_tags_key_is_deleted() {
        let (manager, store) = manager();
        let tags = manager.tags();
        tags.add_association("tag_a", "x.jpg").await.unwrap();
        tags.remove_association("tag_a", "x.jpg").await.unwrap();

        assert!(store.get(&keys::file_tags("x.jpg")).await.unwrap().is_none());
        assert!(store.get(&keys::tag_files("tag_a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_owner_clears_back_references() {
        let (manager, store) = manager();
        let tags = manager.tags();
        tags.add_association("tag_a", "x.jpg").await.unwrap();
        tags.add_association("tag_a", "y.jpg").await.unwrap();
        tags.add_association("tag_b", "y.jpg").await.unwrap();

        assert_eq!(tags.purge_owner("tag_a").await.unwrap(), 2);
        assert!(tags.list_owners("x.jpg").await.unwrap().is_empty());
        assert_eq!(tags.list_owners("y.jpg").await.unwrap(), vec!["tag_b"]);
        assert!(store.get(&keys::tag_files("tag_a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_favorite_add_is_idempotent() {
        let (manager, _) = manager();
        let favorites = manager.favorites();

        let first = favorites.add_favorite("default", "x.jpg", "nice").await.unwrap();
        let FavoriteAdd::Added(entry) = first else {
            panic!("expected a new favorite");
        };
        assert_eq!(entry.note, "nice");

        let second = favorites.add_favorite("default", "x.jpg", "").await.unwrap();
        assert_eq!(second, FavoriteAdd::AlreadyPresent(entry.clone()));
        assert_eq!(favorites.file_entries("x.jpg").await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_rekey_file_moves_every_index() {
        let (manager, store) = manager();
        manager.tags().add_association("tag_a", "a.jpg").await.unwrap();
        manager.favorites().add_favorite("default", "a.jpg", "").await.unwrap();
        store
            .put_json(
                &keys::file_stats("a.jpg"),
                &AccessLogList::new(vec![AccessLog {
                    access_type: AccessType::View,
                    access_time: Utc::now(),
                }]),
            )
            .await
            .unwrap();
        manager.track_stats("a.jpg").await.unwrap();

        assert_eq!(manager.rekey_file("a.jpg", "d/a.jpg").await, 0);

        assert_eq!(manager.tags().list_members("tag_a").await.unwrap(), vec!["d/a.jpg"]);
        assert_eq!(manager.tags().list_owners("d/a.jpg").await.unwrap(), vec!["tag_a"]);
        assert!(manager.tags().list_owners("a.jpg").await.unwrap().is_empty());
        assert_eq!(manager.favorites().list_members("default").await.unwrap(), vec!["d/a.jpg"]);
        assert!(store.get(&keys::file_stats("a.jpg")).await.unwrap().is_none());
        assert!(store.get(&keys::file_stats("d/a.jpg")).await.unwrap().is_some());
        assert_eq!(manager.stats_index().await.unwrap().files, vec!["d/a.jpg"]);
    }

    #[tokio::test]
    async fn test_spawned_followup_forgets_deleted_files() {
        let (manager, _) = manager();
        manager.tags().add_association("tag_a", "gone.jpg").await.unwrap();
        manager.favorites().add_favorite("default", "gone.jpg", "").await.unwrap();

        let handle = manager
            .spawn_followup(IndexFollowup {
                removed: vec!["gone.jpg".into()],
                moved: vec![],
            })
            .unwrap();
        let report = handle.await.unwrap();

        assert_eq!(report, FollowupReport { succeeded: 1, failed: 0 });
        assert!(manager.tags().list_members("tag_a").await.unwrap().is_empty());
        assert!(manager.favorites().list_members("default").await.unwrap().is_empty());
        assert!(manager.spawn_followup(IndexFollowup::default()).is_none());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_reported_not_emptied() {
        let (manager, store) = manager();
        store.put(&keys::tag_files("tag_a"), "{\"files\": 3}", None).await.unwrap();
        assert!(manager.tags().list_members("tag_a").await.is_err());
    }
}
