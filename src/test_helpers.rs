/*!
 * Test Helpers and Utilities
 *
 * Builds an application state over in-memory stores so that services and
 * routes can be exercised without a database or a real storage backend.
 * Tests can modify the returned objects as needed.
 */

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{
    build_app,
    config::Config,
    metadata::{
        keys, ListOptions, ListPage, MemoryMetadataStore, MetadataStore, StoreResult, StoredEntry,
    },
    models::{Channel, FileRecord},
    storage::{memory::MemoryChannel, ChannelRegistry},
    AppState,
};

/// Creates a test configuration with sensible defaults
pub fn create_test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".to_string(),
        metadata_store_url: "memory".to_string(),
        object_store_path: None,
        s3_enabled: false,
        s3_config: None,
        telegram_config: None,
        batch_timeout_seconds: 25,
        max_batch_folders: 50,
        default_page_size: 50,
        storage_stats_cache_seconds: 3600,
        cors_allowed_origins: Vec::new(),
    }
}

/// Application state plus handles on its in-memory backends
pub struct TestContext {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryMetadataStore>,
    pub bucket: Arc<MemoryChannel>,
    pub messaging: Arc<MemoryChannel>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(create_test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryMetadataStore::new());
        let bucket = Arc::new(MemoryChannel::object_store());
        let messaging = Arc::new(MemoryChannel::messaging());
        let channels = ChannelRegistry::new()
            .with_object_store(bucket.clone())
            .with_messaging(messaging.clone());
        let state = Arc::new(AppState::new(
            config,
            store.clone() as Arc<dyn MetadataStore>,
            channels,
        ));
        Self {
            state,
            store,
            bucket,
            messaging,
        }
    }

    pub fn app(&self) -> Router {
        build_app(self.state.clone())
    }

    /// Upload `path` to the object bucket through the file service
    pub async fn seed_file(&self, path: &str, data: &[u8]) -> FileRecord {
        self.state
            .file_service()
            .store_file(path, data, Channel::ObjectStore, None)
            .await
            .expect("seeding a test file should succeed")
    }

    pub async fn seed_files(&self, paths: &[&str]) {
        for path in paths {
            self.seed_file(path, path.as_bytes()).await;
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata store wrapper that remembers every key read and every prefix
/// listed, for tests that assert how much of the store an operation touches
pub struct RecordingStore {
    inner: Arc<dyn MetadataStore>,
    reads: Mutex<Vec<String>>,
    listings: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
            listings: Mutex::new(Vec::new()),
        }
    }

    /// Prefixes passed to `list`, in call order
    pub fn listings(&self) -> Vec<String> {
        self.listings.lock().unwrap().clone()
    }

    /// Keys read with `get` that are file records rather than index or
    /// folder keys
    pub fn file_reads(&self) -> Vec<String> {
        self.reads
            .lock()
            .unwrap()
            .iter()
            .filter(|key| !keys::is_reserved(key))
            .cloned()
            .collect()
    }

    pub fn reset(&self) {
        self.reads.lock().unwrap().clear();
        self.listings.lock().unwrap().clear();
    }
}

#[async_trait]
impl MetadataStore for RecordingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        self.reads.lock().unwrap().push(key.to_string());
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, metadata: Option<&Value>) -> StoreResult<()> {
        self.inner.put(key, value, metadata).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ListPage> {
        self.listings.lock().unwrap().push(options.prefix.clone());
        self.inner.list(options).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}
