use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    View,
    Download,
    Share,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub access_type: AccessType,
    pub access_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordAccessRequest {
    #[serde(default)]
    pub file_id: String,
    pub access_type: AccessType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ToSchema)]
pub enum StatsPeriod {
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl StatsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Week => "7d",
            StatsPeriod::Month => "30d",
            StatsPeriod::Quarter => "90d",
            StatsPeriod::Year => "1y",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct FileStatsQuery {
    pub period: Option<StatsPeriod>,
    /// MIME major type (`image`, `video`, ...) or `all`
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub group_by: Option<TimeBucket>,
    pub detailed: Option<bool>,
    pub start: Option<usize>,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct AccessCounts {
    pub count: usize,
    pub views: usize,
    pub downloads: usize,
    pub shares: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TimeSeriesPoint {
    pub time: String,
    pub views: usize,
    pub downloads: usize,
    pub shares: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileAccessSummary {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: Option<f64>,
    pub upload_time: Option<i64>,
    pub view_count: usize,
    pub download_count: usize,
    pub share_count: usize,
    pub total_access: usize,
    pub last_accessed: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileStatsReport {
    pub success: bool,
    pub period: StatsPeriod,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_files: usize,
    pub total_views: usize,
    pub total_downloads: usize,
    pub total_shares: usize,
    pub file_type_stats: BTreeMap<String, AccessCounts>,
    pub time_series_data: Vec<TimeSeriesPoint>,
    pub files: Vec<FileAccessSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UsageBucket {
    pub size: f64,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadTrend {
    pub month: String,
    pub size: f64,
    pub count: usize,
}

/// Storage usage over every file record; cached under `manage@storage_stats@cache`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub total_size: f64,
    pub total_files: usize,
    pub channel_stats: BTreeMap<String, UsageBucket>,
    pub type_stats: BTreeMap<String, UsageBucket>,
    pub size_distribution: BTreeMap<String, UsageBucket>,
    pub directory_stats: BTreeMap<String, UsageBucket>,
    pub upload_trends: Vec<UploadTrend>,
    pub channel_percentages: BTreeMap<String, String>,
    pub type_percentages: BTreeMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StorageUsageResponse {
    pub success: bool,
    pub cached: bool,
    #[serde(flatten)]
    pub usage: StorageUsage,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StorageUsageQuery {
    /// Ignore the cached snapshot
    pub refresh: Option<bool>,
}

/// MIME-type family used by both stats endpoints
pub fn mime_category(mime: &str) -> &'static str {
    if mime.starts_with("image/") {
        "images"
    } else if mime.starts_with("video/") {
        "videos"
    } else if mime.starts_with("audio/") {
        "audio"
    } else if mime.starts_with("text/") || mime.contains("document") || mime.contains("pdf") {
        "documents"
    } else if mime.contains("zip") || mime.contains("rar") || mime.contains("tar") {
        "archives"
    } else {
        "others"
    }
}

/// Size bucket for a size in megabytes
pub fn size_category(size_mb: f64) -> &'static str {
    if size_mb < 1.0 {
        "small"
    } else if size_mb < 10.0 {
        "medium"
    } else if size_mb < 100.0 {
        "large"
    } else {
        "xlarge"
    }
}
