//! Offline repair of the bidirectional indices
//!
//! The owner side (`manage@tag_files@*`, `manage@favorite_files@*`) is
//! authoritative. A pass compares it with the file side, reports every
//! divergence and, when asked to apply, rewrites the file side to match and
//! drops members whose file record is gone. Never run implicitly.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::ManageResult;
use crate::metadata::{keys, MetadataStore, MetadataStoreExt};
use crate::models::index::{FavoriteEntryList, FileFavoriteList, FileList, TagIdList};
use crate::models::{FavoriteEntry, DEFAULT_GROUP_ID};
use crate::services::file_service::FileService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Owner lists the file, the file does not list the owner
    MissingReverse,
    /// File lists an owner that does not list it (or no longer exists)
    OrphanReverse,
    /// Owner lists a file whose record is gone
    DanglingMember,
    /// Member list left behind by a deleted owner
    DanglingOwner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub index: &'static str,
    pub kind: DivergenceKind,
    pub owner: String,
    pub member: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub owners_scanned: usize,
    pub members_scanned: usize,
    pub divergences: Vec<Divergence>,
    pub keys_rewritten: usize,
    pub applied: bool,
}

/// What one index should look like after repair
#[derive(Debug, Default)]
struct Plan {
    divergences: Vec<Divergence>,
    /// Owners whose member list lost dangling members
    owners: BTreeMap<String, Vec<String>>,
    /// Members whose owner list must be rewritten
    reverse: BTreeMap<String, Vec<String>>,
}

fn plan(
    index: &'static str,
    owners: &BTreeMap<String, Vec<String>>,
    reverse: &BTreeMap<String, Vec<String>>,
    live_files: &HashMap<String, bool>,
) -> Plan {
    let mut plan = Plan::default();
    let mut expected: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (owner, members) in owners {
        let mut kept: Vec<String> = Vec::new();
        for member in members {
            if !live_files.get(member).copied().unwrap_or(false) {
                plan.divergences.push(Divergence {
                    index,
                    kind: DivergenceKind::DanglingMember,
                    owner: owner.clone(),
                    member: Some(member.clone()),
                });
                continue;
            }
            if !kept.contains(member) {
                kept.push(member.clone());
                expected.entry(member.clone()).or_default().push(owner.clone());
            }
        }
        if &kept != members {
            plan.owners.insert(owner.clone(), kept);
        }
    }

    let empty = Vec::new();
    for (member, actual) in reverse {
        let wanted = expected.get(member).unwrap_or(&empty);
        for owner in actual.iter().filter(|o| !wanted.contains(o)) {
            plan.divergences.push(Divergence {
                index,
                kind: DivergenceKind::OrphanReverse,
                owner: owner.clone(),
                member: Some(member.clone()),
            });
        }
    }
    for (member, wanted) in &expected {
        let actual = reverse.get(member).unwrap_or(&empty);
        for owner in wanted.iter().filter(|o| !actual.contains(o)) {
            plan.divergences.push(Divergence {
                index,
                kind: DivergenceKind::MissingReverse,
                owner: owner.clone(),
                member: Some(member.clone()),
            });
        }
    }

    for member in reverse.keys().chain(expected.keys()) {
        let actual = reverse.get(member).unwrap_or(&empty);
        let wanted = expected.get(member).unwrap_or(&empty);
        let same = actual.len() == wanted.len() && wanted.iter().all(|o| actual.contains(o));
        if !same {
            plan.reverse.insert(member.clone(), wanted.clone());
        }
    }
    plan
}

pub struct Reconciler {
    store: Arc<dyn MetadataStore>,
    files: FileService,
}

impl Reconciler {
    pub fn new(store: Arc<dyn MetadataStore>, files: FileService) -> Self {
        Self { store, files }
    }

    async fn live_files<'a>(&self, paths: impl Iterator<Item = &'a String>) -> ManageResult<HashMap<String, bool>> {
        let mut live = HashMap::new();
        for path in paths {
            if !live.contains_key(path) {
                live.insert(path.clone(), self.files.exists(path).await?);
            }
        }
        Ok(live)
    }

    /// Owner keys under `prefix`, split by whether the owner record still exists
    async fn owner_keys(&self, prefix: &str, record_key: fn(&str) -> String) -> ManageResult<(Vec<String>, Vec<String>)> {
        let mut live = Vec::new();
        let mut dangling = Vec::new();
        for key in self.store.list_all(prefix).await? {
            let owner = key.name[prefix.len()..].to_string();
            let exists = (owner == DEFAULT_GROUP_ID && prefix == keys::FAVORITE_FILES_PREFIX)
                || self.store.get(&record_key(&owner)).await?.is_some();
            if exists {
                live.push(owner);
            } else {
                dangling.push(owner);
            }
        }
        Ok((live, dangling))
    }

    async fn reconcile_tags(&self, apply: bool, report: &mut ReconcileReport) -> ManageResult<()> {
        let (live_owners, dangling) = self.owner_keys(keys::TAG_FILES_PREFIX, keys::tag).await?;

        let mut owners = BTreeMap::new();
        for tag_id in live_owners {
            let list: FileList = self
                .store
                .get_record(&keys::tag_files(&tag_id))
                .await?
                .unwrap_or_default();
            owners.insert(tag_id, list.files);
        }
        let mut reverse = BTreeMap::new();
        for key in self.store.list_all(keys::FILE_TAGS_PREFIX).await? {
            let list: TagIdList = self.store.get_record(&key.name).await?.unwrap_or_default();
            reverse.insert(key.name[keys::FILE_TAGS_PREFIX.len()..].to_string(), list.tags);
        }

        let live = self
            .live_files(owners.values().flatten().chain(reverse.keys()))
            .await?;
        let plan = plan("tags", &owners, &reverse, &live);
        report.owners_scanned += owners.len() + dangling.len();
        report.members_scanned += reverse.len();
        report.divergences.extend(plan.divergences.iter().cloned());
        report.divergences.extend(dangling.iter().map(|owner| Divergence {
            index: "tags",
            kind: DivergenceKind::DanglingOwner,
            owner: owner.clone(),
            member: None,
        }));

        if apply {
            for (tag_id, files) in plan.owners {
                self.store
                    .put_json(&keys::tag_files(&tag_id), &FileList::new(files))
                    .await?;
                report.keys_rewritten += 1;
            }
            for (path, tags) in plan.reverse {
                if tags.is_empty() {
                    self.store.delete(&keys::file_tags(&path)).await?;
                } else {
                    self.store
                        .put_json(&keys::file_tags(&path), &TagIdList::new(tags))
                        .await?;
                }
                report.keys_rewritten += 1;
            }
            for tag_id in dangling {
                self.store.delete(&keys::tag_files(&tag_id)).await?;
                report.keys_rewritten += 1;
            }
        }
        Ok(())
    }

    async fn reconcile_favorites(&self, apply: bool, report: &mut ReconcileReport) -> ManageResult<()> {
        let (live_owners, dangling) = self
            .owner_keys(keys::FAVORITE_FILES_PREFIX, keys::favorite_group)
            .await?;

        let mut entries: HashMap<(String, String), FavoriteEntry> = HashMap::new();
        let mut owners = BTreeMap::new();
        for group_id in live_owners {
            let list: FavoriteEntryList = self
                .store
                .get_record(&keys::favorite_files(&group_id))
                .await?
                .unwrap_or_default();
            let mut members = Vec::new();
            for entry in list.files {
                members.push(entry.file_id.clone());
                entries.insert((group_id.clone(), entry.file_id.clone()), entry);
            }
            owners.insert(group_id, members);
        }
        let mut reverse = BTreeMap::new();
        for key in self.store.list_all(keys::FILE_FAVORITES_PREFIX).await? {
            let list: FileFavoriteList = self.store.get_record(&key.name).await?.unwrap_or_default();
            reverse.insert(
                key.name[keys::FILE_FAVORITES_PREFIX.len()..].to_string(),
                list.favorites.into_iter().map(|e| e.group_id).collect::<Vec<_>>(),
            );
        }

        let live = self
            .live_files(owners.values().flatten().chain(reverse.keys()))
            .await?;
        let plan = plan("favorites", &owners, &reverse, &live);
        report.owners_scanned += owners.len() + dangling.len();
        report.members_scanned += reverse.len();
        report.divergences.extend(plan.divergences.iter().cloned());
        report.divergences.extend(dangling.iter().map(|owner| Divergence {
            index: "favorites",
            kind: DivergenceKind::DanglingOwner,
            owner: owner.clone(),
            member: None,
        }));

        if apply {
            for (group_id, files) in plan.owners {
                let kept: Vec<FavoriteEntry> = files
                    .iter()
                    .filter_map(|f| entries.get(&(group_id.clone(), f.clone())).cloned())
                    .collect();
                self.store
                    .put_json(&keys::favorite_files(&group_id), &FavoriteEntryList::new(kept))
                    .await?;
                report.keys_rewritten += 1;
            }
            for (path, groups) in plan.reverse {
                let favorites: Vec<FavoriteEntry> = groups
                    .iter()
                    .filter_map(|g| entries.get(&(g.clone(), path.clone())).cloned())
                    .collect();
                if favorites.is_empty() {
                    self.store.delete(&keys::file_favorites(&path)).await?;
                } else {
                    self.store
                        .put_json(&keys::file_favorites(&path), &FileFavoriteList::new(favorites))
                        .await?;
                }
                report.keys_rewritten += 1;
            }
            for group_id in dangling {
                self.store.delete(&keys::favorite_files(&group_id)).await?;
                report.keys_rewritten += 1;
            }
        }
        Ok(())
    }

    pub async fn run(&self, apply: bool) -> ManageResult<ReconcileReport> {
        let mut report = ReconcileReport {
            applied: apply,
            ..Default::default()
        };
        self.reconcile_tags(apply, &mut report).await?;
        self.reconcile_favorites(apply, &mut report).await?;

        if report.divergences.is_empty() {
            info!("Indices are consistent ({} owners scanned)", report.owners_scanned);
        } else {
            warn!(
                "Found {} index divergences; {} keys rewritten",
                report.divergences.len(),
                report.keys_rewritten
            );
        }
        Ok(report)
    }
}
