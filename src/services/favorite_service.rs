use chrono::Utc;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{ManageError, ManageResult};
use crate::metadata::{keys, MetadataStore, MetadataStoreExt};
use crate::models::index::GroupIdList;
use crate::models::{
    generate_id, AddFavoriteRequest, CreateGroupRequest, FavoriteEntry, FavoriteGroup,
    FavoriteSortBy, FileEntry, SortOrder, DEFAULT_GROUP_COLOR, DEFAULT_GROUP_ICON,
    DEFAULT_GROUP_ID,
};
use crate::services::file_service::FileService;
use crate::services::index_manager::{AssociationIndex, FavoriteAdd, FavoriteIndex};
use crate::services::search_service::{file_entry, paginate, Page};

/// One page of a favorite group
#[derive(Debug, Clone)]
pub struct FavoritePage {
    pub group: FavoriteGroup,
    pub page: Page<FileEntry>,
}

#[derive(Clone)]
pub struct FavoriteService {
    store: Arc<dyn MetadataStore>,
    index: FavoriteIndex,
    files: FileService,
}

impl FavoriteService {
    pub fn new(store: Arc<dyn MetadataStore>, files: FileService) -> Self {
        Self {
            index: FavoriteIndex::new(store.clone()),
            store,
            files,
        }
    }

    async fn group_ids(&self) -> ManageResult<GroupIdList> {
        Ok(self
            .store
            .get_record(keys::FAVORITE_GROUPS_INDEX)
            .await?
            .unwrap_or_default())
    }

    /// The default group exists as soon as anyone looks for it
    pub async fn ensure_default_group(&self) -> ManageResult<FavoriteGroup> {
        if let Some(group) = self
            .store
            .get_json::<FavoriteGroup>(&keys::favorite_group(DEFAULT_GROUP_ID))
            .await?
        {
            return Ok(group);
        }

        let now = Utc::now();
        let group = FavoriteGroup {
            id: DEFAULT_GROUP_ID.to_string(),
            name: "Default".to_string(),
            description: "Default favorites".to_string(),
            color: DEFAULT_GROUP_COLOR.to_string(),
            icon: DEFAULT_GROUP_ICON.to_string(),
            is_default: true,
            created_at: now,
            updated_at: now,
            file_count: 0,
        };
        self.store
            .put_json(&keys::favorite_group(DEFAULT_GROUP_ID), &group)
            .await?;

        let mut index = self.group_ids().await?;
        if !index.groups.iter().any(|g| g == DEFAULT_GROUP_ID) {
            index.groups.insert(0, DEFAULT_GROUP_ID.to_string());
            self.store.put_json(keys::FAVORITE_GROUPS_INDEX, &index).await?;
        }
        if self.store.get(&keys::favorite_files(DEFAULT_GROUP_ID)).await?.is_none() {
            self.index.init_owner(DEFAULT_GROUP_ID).await?;
        }
        info!("Created default favorite group");
        Ok(group)
    }

    pub async fn find_group(&self, group_id: &str) -> ManageResult<Option<FavoriteGroup>> {
        if group_id == DEFAULT_GROUP_ID {
            let mut group = self.ensure_default_group().await?;
            group.file_count = self.index.list_members(group_id).await?.len();
            return Ok(Some(group));
        }
        if group_id.is_empty() || group_id == "index" {
            return Ok(None);
        }
        let Some(mut group) = self
            .store
            .get_json::<FavoriteGroup>(&keys::favorite_group(group_id))
            .await?
        else {
            return Ok(None);
        };
        group.file_count = self.index.list_members(group_id).await?.len();
        Ok(Some(group))
    }

    pub async fn get_group(&self, group_id: &str) -> ManageResult<FavoriteGroup> {
        self.find_group(group_id)
            .await?
            .ok_or_else(|| ManageError::not_found("Favorite group not found"))
    }

    pub async fn list_groups(&self) -> ManageResult<Vec<FavoriteGroup>> {
        self.ensure_default_group().await?;
        let mut groups = Vec::new();
        for group_id in self.group_ids().await?.groups {
            match self.find_group(&group_id).await? {
                Some(group) => groups.push(group),
                None => warn!("Favorite group index lists {} but the group is missing", group_id),
            }
        }
        Ok(groups)
    }

    pub async fn create_group(&self, request: CreateGroupRequest) -> ManageResult<FavoriteGroup> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ManageError::validation("Group name is required"));
        }
        let wanted = name.to_lowercase();
        if self
            .list_groups()
            .await?
            .iter()
            .any(|g| g.name.trim().to_lowercase() == wanted)
        {
            return Err(ManageError::conflict("Group name already exists"));
        }

        let now = Utc::now();
        let group = FavoriteGroup {
            id: generate_id("group"),
            name: name.to_string(),
            description: request.description.unwrap_or_default(),
            color: request
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GROUP_COLOR.to_string()),
            icon: request
                .icon
                .filter(|i| !i.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GROUP_ICON.to_string()),
            is_default: false,
            created_at: now,
            updated_at: now,
            file_count: 0,
        };
        self.store
            .put_json(&keys::favorite_group(&group.id), &group)
            .await?;

        let mut index = self.group_ids().await?;
        index.groups.push(group.id.clone());
        self.store.put_json(keys::FAVORITE_GROUPS_INDEX, &index).await?;
        self.index.init_owner(&group.id).await?;

        info!("Created favorite group {} ({})", group.name, group.id);
        Ok(group)
    }

    /// Delete a group and every favorite in it. The default group stays.
    pub async fn delete_group(&self, group_id: &str) -> ManageResult<usize> {
        if group_id == DEFAULT_GROUP_ID {
            return Err(ManageError::validation("The default group cannot be deleted"));
        }
        self.get_group(group_id).await?;
        let cleaned = self.index.purge_owner(group_id).await?;
        self.store.delete(&keys::favorite_group(group_id)).await?;

        let mut index = self.group_ids().await?;
        index.groups.retain(|g| g != group_id);
        self.store.put_json(keys::FAVORITE_GROUPS_INDEX, &index).await?;

        info!("Deleted favorite group {} with {} favorites", group_id, cleaned);
        Ok(cleaned)
    }

    fn group_or_default(group_id: Option<&str>) -> &str {
        group_id
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_GROUP_ID)
    }

    /// Put a file into a group, reporting whether it was already there
    pub async fn favorite_file(&self, path: &str, group_id: Option<&str>, note: &str) -> ManageResult<FavoriteAdd> {
        let group_id = Self::group_or_default(group_id);
        self.files.require_record(path).await?;
        self.get_group(group_id).await?;
        Ok(self.index.add_favorite(group_id, path, note).await?)
    }

    pub async fn add_favorite(&self, request: AddFavoriteRequest) -> ManageResult<FavoriteEntry> {
        if request.file_id.trim().is_empty() {
            return Err(ManageError::validation("File ID is required"));
        }
        let note = request.note.unwrap_or_default();
        match self
            .favorite_file(&request.file_id, request.group_id.as_deref(), &note)
            .await?
        {
            FavoriteAdd::Added(entry) => {
                info!("Added {} to favorite group {}", entry.file_id, entry.group_id);
                Ok(entry)
            }
            FavoriteAdd::AlreadyPresent(_) => Err(ManageError::conflict("File is already in favorites")),
        }
    }

    /// Remove a file from one group, or from every group when none is given.
    /// Returns the groups it was removed from.
    pub async fn remove_favorite(&self, path: &str, group_id: Option<&str>) -> ManageResult<Vec<String>> {
        let owners = self.index.list_owners(path).await?;
        if owners.is_empty() {
            return Err(ManageError::not_found("File is not in any favorites"));
        }

        let targets: Vec<String> = match group_id.map(str::trim).filter(|g| !g.is_empty()) {
            Some(group_id) => {
                if !owners.iter().any(|g| g == group_id) {
                    return Err(ManageError::not_found(
                        "File is not in the specified favorite group",
                    ));
                }
                vec![group_id.to_string()]
            }
            None => owners,
        };

        let mut removed = Vec::new();
        for group_id in targets {
            if self.index.remove_association(&group_id, path).await? {
                removed.push(group_id);
            }
        }
        info!("Removed {} from {} favorite groups", path, removed.len());
        Ok(removed)
    }

    /// Members of a group joined with their file records
    pub async fn list_favorites(
        &self,
        group_id: Option<&str>,
        sort_by: FavoriteSortBy,
        sort_order: SortOrder,
        start: usize,
        count: usize,
    ) -> ManageResult<FavoritePage> {
        let group = self.get_group(Self::group_or_default(group_id)).await?;

        let mut entries = Vec::new();
        for favorite in self.index.entries(&group.id).await? {
            match self.files.get_record(&favorite.file_id).await? {
                Some(record) => {
                    let mut entry = file_entry(&record);
                    entry.favorite = Some(favorite);
                    entries.push(entry);
                }
                None => warn!(
                    "Favorite group {} lists missing file {}",
                    group.id, favorite.file_id
                ),
            }
        }

        sort_favorites(&mut entries, sort_by, sort_order);
        Ok(FavoritePage {
            group,
            page: paginate(entries, start, count),
        })
    }
}

fn sort_favorites(entries: &mut [FileEntry], sort_by: FavoriteSortBy, sort_order: SortOrder) {
    entries.sort_by(|a, b| {
        let ordering = match sort_by {
            FavoriteSortBy::AddedAt => {
                let added = |e: &FileEntry| e.favorite.as_ref().map(|f| f.added_at);
                added(a).cmp(&added(b))
            }
            FavoriteSortBy::Name => a.file_name.to_lowercase().cmp(&b.file_name.to_lowercase()),
            FavoriteSortBy::Size => a
                .file_size
                .unwrap_or(0.0)
                .partial_cmp(&b.file_size.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
            FavoriteSortBy::Time => a.upload_time.unwrap_or(0).cmp(&b.upload_time.unwrap_or(0)),
        };
        match sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}
