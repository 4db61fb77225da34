use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;

use crate::models::{S3ChannelConfig, TelegramChannelConfig, DEFAULT_S3_PROFILE};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// `memory` or a sqlite URL
    pub metadata_store_url: String,
    pub object_store_path: Option<String>,

    // S3 channel
    pub s3_enabled: bool,
    pub s3_config: Option<S3ChannelConfig>,

    // Messaging blob channel
    pub telegram_config: Option<TelegramChannelConfig>,

    // Limits
    pub batch_timeout_seconds: u64,
    pub max_batch_folders: usize,
    pub default_page_size: usize,
    pub storage_stats_cache_seconds: i64,

    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // .env is optional
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let server_address = or_default("SERVER_ADDRESS", "0.0.0.0:8000");
        let metadata_store_url = or_default("METADATA_STORE_URL", "sqlite:imghub.db?mode=rwc");

        let object_store_path = match get("OBJECT_STORE_PATH") {
            Some(path) if path.eq_ignore_ascii_case("none") => None,
            Some(path) => Some(path),
            None => Some("./uploads".to_string()),
        };

        let s3_enabled = parse_bool(get("S3_ENABLED").as_deref(), "S3_ENABLED")?;
        let s3_config = if s3_enabled {
            let bucket_name = get("S3_BUCKET_NAME")
                .ok_or_else(|| anyhow!("S3_ENABLED is set but S3_BUCKET_NAME is missing"))?;
            Some(S3ChannelConfig {
                profile: or_default("S3_PROFILE", DEFAULT_S3_PROFILE),
                bucket_name,
                region: or_default("S3_REGION", "us-east-1"),
                access_key_id: get("S3_ACCESS_KEY_ID")
                    .ok_or_else(|| anyhow!("S3_ENABLED is set but S3_ACCESS_KEY_ID is missing"))?,
                secret_access_key: get("S3_SECRET_ACCESS_KEY")
                    .ok_or_else(|| anyhow!("S3_ENABLED is set but S3_SECRET_ACCESS_KEY is missing"))?,
                endpoint_url: get("S3_ENDPOINT_URL"),
            })
        } else {
            None
        };

        let telegram_config = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramChannelConfig {
                bot_token,
                chat_id,
                api_url: or_default("TELEGRAM_API_URL", "https://api.telegram.org"),
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together"
                ))
            }
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Config {
            server_address,
            metadata_store_url,
            object_store_path,
            s3_enabled,
            s3_config,
            telegram_config,
            batch_timeout_seconds: parse_number(get("BATCH_TIMEOUT_SECONDS"), "BATCH_TIMEOUT_SECONDS", 25)?,
            max_batch_folders: parse_number(get("MAX_BATCH_FOLDERS"), "MAX_BATCH_FOLDERS", 50)?,
            default_page_size: parse_number(get("DEFAULT_PAGE_SIZE"), "DEFAULT_PAGE_SIZE", 50)?,
            storage_stats_cache_seconds: parse_number(
                get("STORAGE_STATS_CACHE_SECONDS"),
                "STORAGE_STATS_CACHE_SECONDS",
                3600,
            )?,
            cors_allowed_origins,
        };

        if config.default_page_size == 0 {
            return Err(anyhow!("DEFAULT_PAGE_SIZE must be greater than zero"));
        }

        Ok(config)
    }
}

fn parse_number<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .parse::<T>()
            .with_context(|| format!("{} must be a number, got '{}'", key, v)),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<&str>, key: &str) -> Result<bool> {
    match value.map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(false),
        Some(v) => Err(anyhow!("{} must be a boolean, got '{}'", key, v)),
    }
}
