pub mod config;
pub mod errors;
pub mod metadata;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod swagger;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

#[cfg(test)]
mod tests;

use axum::Router;
use std::sync::Arc;

use config::Config;
use metadata::MetadataStore;
use services::{
    batch_executor::BatchExecutor, favorite_service::FavoriteService, file_service::FileService,
    folder_service::FolderService, index_manager::IndexManager, reconcile::Reconciler,
    search_service::SearchService, stats_service::StatsService, tag_service::TagService,
};
use storage::ChannelRegistry;

/// Shared state handed to every handler. Services are cheap views over the
/// store and the channel registry and are built per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn MetadataStore>,
    pub channels: Arc<ChannelRegistry>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn MetadataStore>, channels: ChannelRegistry) -> Self {
        Self {
            config,
            store,
            channels: Arc::new(channels),
        }
    }

    pub fn file_service(&self) -> FileService {
        FileService::new(self.store.clone(), self.channels.clone())
    }

    pub fn tag_service(&self) -> TagService {
        TagService::new(self.store.clone(), self.file_service())
    }

    pub fn favorite_service(&self) -> FavoriteService {
        FavoriteService::new(self.store.clone(), self.file_service())
    }

    pub fn folder_service(&self) -> FolderService {
        FolderService::new(self.store.clone(), self.config.max_batch_folders)
    }

    pub fn search_service(&self) -> SearchService {
        SearchService::new(
            self.store.clone(),
            self.file_service(),
            self.tag_service(),
            self.config.default_page_size,
        )
    }

    pub fn stats_service(&self) -> StatsService {
        StatsService::new(
            self.store.clone(),
            self.file_service(),
            self.config.storage_stats_cache_seconds,
            self.config.default_page_size,
        )
    }

    pub fn batch_executor(&self) -> BatchExecutor {
        BatchExecutor::new(self.file_service(), self.tag_service(), self.favorite_service())
    }

    pub fn indices(&self) -> IndexManager {
        IndexManager::new(self.store.clone())
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.store.clone(), self.file_service())
    }
}

/// The full HTTP application without outer layers (CORS, Swagger UI)
pub fn build_app(state: Arc<AppState>) -> Router {
    routes::api_router().with_state(state)
}
