pub mod batch_executor;
pub mod favorite_service;
pub mod file_service;
pub mod folder_service;
pub mod index_manager;
pub mod reconcile;
#[cfg(feature = "s3")]
pub mod s3_service;
pub mod search_service;
pub mod stats_service;
pub mod tag_service;
pub mod telegram_service;
