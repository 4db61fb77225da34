use serde::{Deserialize, Serialize};

/// Connection settings for one S3-compatible bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3ChannelConfig {
    /// Name under which file locators reference these credentials
    pub profile: String,
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>, // For S3-compatible services
}

/// Bot credentials for the messaging blob channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_url: String,
}
