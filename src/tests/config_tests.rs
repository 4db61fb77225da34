use crate::config::Config;
use std::collections::HashMap;

fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| map.get(key).cloned())
}

#[test]
fn test_defaults_when_nothing_is_set() {
    let config = load(&[]).expect("Config should load successfully");

    assert_eq!(config.server_address, "0.0.0.0:8000");
    assert_eq!(config.metadata_store_url, "sqlite:imghub.db?mode=rwc");
    assert_eq!(config.object_store_path.as_deref(), Some("./uploads"));
    assert!(!config.s3_enabled);
    assert!(config.s3_config.is_none());
    assert!(config.telegram_config.is_none());
    assert_eq!(config.batch_timeout_seconds, 25);
    assert_eq!(config.max_batch_folders, 50);
    assert_eq!(config.default_page_size, 50);
    assert_eq!(config.storage_stats_cache_seconds, 3600);
    assert!(config.cors_allowed_origins.is_empty());
}

#[test]
fn test_s3_settings_are_collected() {
    let config = load(&[
        ("S3_ENABLED", "true"),
        ("S3_BUCKET_NAME", "pictures"),
        ("S3_ACCESS_KEY_ID", "AKIA"),
        ("S3_SECRET_ACCESS_KEY", "secret"),
        ("S3_ENDPOINT_URL", "http://minio:9000"),
        ("S3_PROFILE", "minio"),
    ])
    .expect("Config should load successfully");

    let s3 = config.s3_config.expect("S3 config should be present");
    assert_eq!(s3.bucket_name, "pictures");
    assert_eq!(s3.region, "us-east-1");
    assert_eq!(s3.profile, "minio");
    assert_eq!(s3.endpoint_url.as_deref(), Some("http://minio:9000"));
}

#[test]
fn test_s3_enabled_without_bucket_fails() {
    let err = load(&[("S3_ENABLED", "true")]).unwrap_err();
    assert!(err.to_string().contains("S3_BUCKET_NAME"));
}

#[test]
fn test_telegram_requires_token_and_chat() {
    let config = load(&[("TELEGRAM_BOT_TOKEN", "123:abc"), ("TELEGRAM_CHAT_ID", "-100")]).unwrap();
    let telegram = config.telegram_config.unwrap();
    assert_eq!(telegram.api_url, "https://api.telegram.org");

    assert!(load(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).is_err());
}

#[test]
fn test_invalid_numbers_are_rejected() {
    let err = load(&[("BATCH_TIMEOUT_SECONDS", "soon")]).unwrap_err();
    assert!(err.to_string().contains("BATCH_TIMEOUT_SECONDS"));

    assert!(load(&[("DEFAULT_PAGE_SIZE", "0")]).is_err());
    assert!(load(&[("S3_ENABLED", "maybe")]).is_err());
}

#[test]
fn test_cors_origins_and_disabled_object_store() {
    let config = load(&[
        ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://img.example.com"),
        ("OBJECT_STORE_PATH", "none"),
    ])
    .unwrap();
    assert_eq!(
        config.cors_allowed_origins,
        vec!["http://localhost:3000", "https://img.example.com"]
    );
    assert!(config.object_store_path.is_none());
}
