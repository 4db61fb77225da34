use chrono::{DateTime, Datelike, Duration, Months, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{ManageError, ManageResult};
use crate::metadata::{keys, MetadataStore, MetadataStoreExt};
use crate::models::index::{AccessLogList, FileList};
use crate::models::{
    mime_category, size_category, AccessCounts, AccessLog, AccessType, Channel,
    FileAccessSummary, FileStatsQuery, FileStatsReport, StatsPeriod, StorageUsage,
    TimeBucket, TimeSeriesPoint, UploadTrend, UsageBucket,
};
use crate::services::file_service::FileService;
use crate::services::index_manager::IndexManager;

const TYPE_CATEGORIES: [&str; 6] = ["images", "videos", "audio", "documents", "archives", "others"];
const SIZE_RANGES: [(&str, &str); 4] = [
    ("small", "< 1MB"),
    ("medium", "1MB - 10MB"),
    ("large", "10MB - 100MB"),
    ("xlarge", "> 100MB"),
];

fn period_start(period: StatsPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    match period {
        StatsPeriod::Week => now - Duration::days(7),
        StatsPeriod::Month => now - Duration::days(30),
        StatsPeriod::Quarter => now - Duration::days(90),
        StatsPeriod::Year => now
            .checked_sub_months(Months::new(12))
            .unwrap_or(now - Duration::days(365)),
    }
}

/// Bucket key of an access, as an ISO timestamp at the start of the bucket.
/// Weeks start on Sunday.
pub fn time_key(at: DateTime<Utc>, bucket: TimeBucket) -> String {
    match bucket {
        TimeBucket::Hour => at.format("%Y-%m-%dT%H:00:00.000Z").to_string(),
        TimeBucket::Day => at.format("%Y-%m-%dT00:00:00.000Z").to_string(),
        TimeBucket::Week => {
            let back = at.weekday().num_days_from_sunday() as i64;
            (at - Duration::days(back))
                .format("%Y-%m-%dT00:00:00.000Z")
                .to_string()
        }
        TimeBucket::Month => at.format("%Y-%m-01T00:00:00.000Z").to_string(),
    }
}

fn percentage(part: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:.2}", part / total * 100.0)
    } else {
        "0.00".to_string()
    }
}

fn channel_label(channel: Channel) -> &'static str {
    match channel {
        Channel::Unknown => "Unknown",
        other => other.as_str(),
    }
}

#[derive(Default)]
struct Tally {
    views: usize,
    downloads: usize,
    shares: usize,
}

impl Tally {
    fn add(&mut self, access_type: AccessType) {
        match access_type {
            AccessType::View => self.views += 1,
            AccessType::Download => self.downloads += 1,
            AccessType::Share => self.shares += 1,
        }
    }

    fn total(&self) -> usize {
        self.views + self.downloads + self.shares
    }
}

/// Access logs and storage usage, both aggregated on read
#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn MetadataStore>,
    files: FileService,
    indices: IndexManager,
    cache_seconds: i64,
    default_page_size: usize,
}

impl StatsService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        files: FileService,
        cache_seconds: i64,
        default_page_size: usize,
    ) -> Self {
        Self {
            indices: IndexManager::new(store.clone()),
            store,
            files,
            cache_seconds,
            default_page_size,
        }
    }

    async fn access_logs(&self, path: &str) -> ManageResult<Vec<AccessLog>> {
        Ok(self
            .store
            .get_record::<AccessLogList>(&keys::file_stats(path))
            .await?
            .map(|list| list.access_logs)
            .unwrap_or_default())
    }

    /// Append one access event to a file's log
    pub async fn record_access(&self, path: &str, access_type: AccessType, at: DateTime<Utc>) -> ManageResult<()> {
        if path.trim().is_empty() {
            return Err(ManageError::validation("File ID is required"));
        }
        self.files.require_record(path).await?;

        let mut logs = self.access_logs(path).await?;
        logs.push(AccessLog {
            access_type,
            access_time: at,
        });
        self.store
            .put_json(&keys::file_stats(path), &AccessLogList::new(logs))
            .await?;
        self.indices.track_stats(path).await?;
        debug!("Recorded {:?} of {}", access_type, path);
        Ok(())
    }

    pub async fn file_stats(&self, query: &FileStatsQuery, now: DateTime<Utc>) -> ManageResult<FileStatsReport> {
        let period = query.period.unwrap_or_default();
        let bucket = query.group_by.unwrap_or_default();
        let start_date = period_start(period, now);
        let mime_prefix = query
            .mime_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "all")
            .map(|t| format!("{}/", t));

        let index: FileList = self
            .store
            .get_record(keys::STATS_INDEX)
            .await?
            .unwrap_or_default();

        let mut report = FileStatsReport {
            success: true,
            period,
            start_date,
            end_date: now,
            total_files: 0,
            total_views: 0,
            total_downloads: 0,
            total_shares: 0,
            file_type_stats: BTreeMap::new(),
            time_series_data: Vec::new(),
            files: Vec::new(),
            total: None,
        };
        let mut series: BTreeMap<String, Tally> = BTreeMap::new();
        let mut summaries = Vec::new();

        for path in &index.files {
            let Some(record) = self.files.get_record(path).await? else {
                warn!("Stats index lists missing file {}", path);
                continue;
            };
            let mime = record.metadata.file_type.clone().unwrap_or_default();
            if mime_prefix.as_ref().is_some_and(|p| !mime.starts_with(p.as_str())) {
                continue;
            }

            let logs: Vec<AccessLog> = self
                .access_logs(path)
                .await?
                .into_iter()
                .filter(|log| log.access_time >= start_date && log.access_time <= now)
                .collect();
            if logs.is_empty() {
                continue;
            }

            let mut tally = Tally::default();
            for log in &logs {
                tally.add(log.access_type);
                series
                    .entry(time_key(log.access_time, bucket))
                    .or_default()
                    .add(log.access_type);
            }

            report.total_files += 1;
            report.total_views += tally.views;
            report.total_downloads += tally.downloads;
            report.total_shares += tally.shares;

            let counts = report
                .file_type_stats
                .entry(mime_category(&mime).to_string())
                .or_default();
            counts.count += 1;
            counts.views += tally.views;
            counts.downloads += tally.downloads;
            counts.shares += tally.shares;

            summaries.push(FileAccessSummary {
                file_id: path.clone(),
                file_name: record.metadata.file_name.clone().unwrap_or_else(|| path.clone()),
                file_type: mime,
                file_size: record.metadata.file_size(),
                upload_time: record.metadata.timestamp,
                view_count: tally.views,
                download_count: tally.downloads,
                share_count: tally.shares,
                total_access: tally.total(),
                last_accessed: logs.iter().map(|l| l.access_time.timestamp_millis()).max(),
            });
        }

        report.time_series_data = series
            .into_iter()
            .map(|(time, tally)| TimeSeriesPoint {
                time,
                views: tally.views,
                downloads: tally.downloads,
                shares: tally.shares,
            })
            .collect();

        if query.detailed.unwrap_or(false) {
            summaries.sort_by(|a, b| b.total_access.cmp(&a.total_access));
            report.total = Some(summaries.len());
            report.files = summaries
                .into_iter()
                .skip(query.start.unwrap_or(0))
                .take(query.count.unwrap_or(self.default_page_size))
                .collect();
        }
        Ok(report)
    }

    async fn compute_usage(&self, now: DateTime<Utc>) -> ManageResult<StorageUsage> {
        let mut usage = StorageUsage {
            last_updated: now,
            ..Default::default()
        };
        for channel in [Channel::ObjectStore, Channel::S3, Channel::MessagingBlob, Channel::Unknown] {
            usage
                .channel_stats
                .insert(channel_label(channel).to_string(), UsageBucket::default());
        }
        for category in TYPE_CATEGORIES {
            usage.type_stats.insert(category.to_string(), UsageBucket::default());
        }
        for (category, range) in SIZE_RANGES {
            usage.size_distribution.insert(
                category.to_string(),
                UsageBucket {
                    range: Some(range.to_string()),
                    ..Default::default()
                },
            );
        }

        let mut trends: BTreeMap<String, UploadTrend> = BTreeMap::new();
        for record in self.files.scan("").await? {
            let metadata = &record.metadata;
            let size = metadata.file_size().unwrap_or(0.0);
            let mime = metadata.file_type.as_deref().unwrap_or_default();
            let directory = metadata
                .directory
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or("root");

            usage.total_size += size;
            usage.total_files += 1;

            let buckets = [
                usage.channel_stats.get_mut(channel_label(metadata.channel())),
                usage.type_stats.get_mut(mime_category(mime)),
                usage.size_distribution.get_mut(size_category(size)),
            ];
            for bucket in buckets.into_iter().flatten() {
                bucket.size += size;
                bucket.count += 1;
            }
            let dir_bucket = usage.directory_stats.entry(directory.to_string()).or_default();
            dir_bucket.size += size;
            dir_bucket.count += 1;

            if let Some(uploaded) = metadata.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis) {
                let month = uploaded.format("%Y-%m").to_string();
                let trend = trends.entry(month.clone()).or_insert_with(|| UploadTrend {
                    month,
                    ..Default::default()
                });
                trend.size += size;
                trend.count += 1;
            }
        }
        usage.upload_trends = trends.into_values().collect();

        for (channel, bucket) in &usage.channel_stats {
            usage
                .channel_percentages
                .insert(channel.clone(), percentage(bucket.size, usage.total_size));
        }
        for (category, bucket) in &usage.type_stats {
            usage
                .type_percentages
                .insert(category.clone(), percentage(bucket.size, usage.total_size));
        }
        Ok(usage)
    }

    /// Storage usage, served from the cache while it is fresh. Returns the
    /// usage and whether it came from the cache.
    pub async fn storage_usage(&self, force_refresh: bool, now: DateTime<Utc>) -> ManageResult<(StorageUsage, bool)> {
        if !force_refresh {
            match self.store.get_json::<StorageUsage>(keys::STORAGE_STATS_CACHE).await {
                Ok(Some(cached)) if (now - cached.last_updated).num_seconds() < self.cache_seconds => {
                    return Ok((cached, true));
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable storage stats cache: {}", e),
            }
        }

        let usage = self.compute_usage(now).await?;
        if let Err(e) = self.store.put_json(keys::STORAGE_STATS_CACHE, &usage).await {
            warn!("Failed to cache storage stats: {}", e);
        }
        info!(
            "Computed storage usage: {} files, {:.2} MB",
            usage.total_files, usage.total_size
        );
        Ok((usage, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use crate::storage::ChannelRegistry;
    use chrono::TimeZone;
    use serde_json::json;

    async fn service() -> StatsService {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let seed = [
            ("a.jpg", "image/jpeg", "0.5", "CloudflareR2", ""),
            ("docs/b.pdf", "application/pdf", "12", "S3", "docs"),
            ("c.mp4", "video/mp4", "150", "Telegram", ""),
        ];
        for (path, mime, size, channel, dir) in seed {
            store
                .put(
                    path,
                    "",
                    Some(&json!({
                        "FileName": path,
                        "FileType": mime,
                        "FileSize": size,
                        "Channel": channel,
                        "Directory": dir,
                        "TimeStamp": 1_717_200_000_000i64,
                    })),
                )
                .await
                .unwrap();
        }
        let files = FileService::new(store.clone(), Arc::new(ChannelRegistry::new()));
        StatsService::new(store, files, 3600, 2)
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_time_keys() {
        // 2024-06-05 is a Wednesday
        let t = at(2024, 6, 5, 13);
        assert_eq!(time_key(t, TimeBucket::Hour), "2024-06-05T13:00:00.000Z");
        assert_eq!(time_key(t, TimeBucket::Day), "2024-06-05T00:00:00.000Z");
        assert_eq!(time_key(t, TimeBucket::Week), "2024-06-02T00:00:00.000Z");
        assert_eq!(time_key(t, TimeBucket::Month), "2024-06-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_access_stats_within_window() {
        let service = service().await;
        let now = at(2024, 6, 10, 12);
        service.record_access("a.jpg", AccessType::View, at(2024, 6, 9, 8)).await.unwrap();
        service.record_access("a.jpg", AccessType::View, at(2024, 6, 9, 9)).await.unwrap();
        service.record_access("a.jpg", AccessType::Share, at(2024, 6, 8, 9)).await.unwrap();
        service.record_access("docs/b.pdf", AccessType::Download, at(2024, 6, 9, 8)).await.unwrap();
        service.record_access("c.mp4", AccessType::View, at(2024, 1, 1, 0)).await.unwrap();

        let query = FileStatsQuery {
            detailed: Some(true),
            ..Default::default()
        };
        let report = service.file_stats(&query, now).await.unwrap();
        assert_eq!(report.total_files, 2);
        assert_eq!(report.total_views, 2);
        assert_eq!(report.total_downloads, 1);
        assert_eq!(report.total_shares, 1);
        assert_eq!(report.file_type_stats["images"].count, 1);
        assert_eq!(report.time_series_data.len(), 2);
        assert_eq!(report.time_series_data[0].time, "2024-06-08T00:00:00.000Z");
        assert_eq!(report.total, Some(2));
        assert_eq!(report.files[0].file_id, "a.jpg");
        assert_eq!(report.files[0].total_access, 3);

        let images = FileStatsQuery {
            mime_type: Some("image".into()),
            ..Default::default()
        };
        let report = service.file_stats(&images, now).await.unwrap();
        assert_eq!(report.total_files, 1);
        assert!(report.files.is_empty());
        assert_eq!(report.total, None);
    }

    #[tokio::test]
    async fn test_detailed_rows_default_to_configured_page_size() {
        let service = service().await;
        let now = at(2024, 6, 10, 12);
        for path in ["a.jpg", "docs/b.pdf", "c.mp4"] {
            service.record_access(path, AccessType::View, at(2024, 6, 9, 8)).await.unwrap();
        }

        let query = FileStatsQuery {
            detailed: Some(true),
            ..Default::default()
        };
        let report = service.file_stats(&query, now).await.unwrap();
        assert_eq!(report.total, Some(3));
        assert_eq!(report.files.len(), 2);

        let explicit = FileStatsQuery {
            detailed: Some(true),
            count: Some(3),
            ..Default::default()
        };
        let report = service.file_stats(&explicit, now).await.unwrap();
        assert_eq!(report.files.len(), 3);
    }

    #[tokio::test]
    async fn test_access_to_missing_file_is_not_found() {
        let service = service().await;
        let err = service
            .record_access("nope.jpg", AccessType::View, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ManageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_storage_usage_and_cache() {
        let service = service().await;
        let now = at(2024, 6, 10, 12);

        let (usage, cached) = service.storage_usage(false, now).await.unwrap();
        assert!(!cached);
        assert_eq!(usage.total_files, 3);
        assert_eq!(usage.total_size, 162.5);
        assert_eq!(usage.channel_stats["S3"].count, 1);
        assert_eq!(usage.type_stats["videos"].size, 150.0);
        assert_eq!(usage.size_distribution["small"].count, 1);
        assert_eq!(usage.size_distribution["xlarge"].range.as_deref(), Some("> 100MB"));
        assert_eq!(usage.directory_stats["root"].count, 2);
        assert_eq!(usage.upload_trends.len(), 1);
        assert_eq!(usage.channel_percentages["Telegram"], "92.31");

        let (_, cached) = service.storage_usage(false, now + Duration::minutes(5)).await.unwrap();
        assert!(cached);
        let (_, cached) = service.storage_usage(true, now + Duration::minutes(5)).await.unwrap();
        assert!(!cached);
        let (_, cached) = service.storage_usage(false, now + Duration::hours(2)).await.unwrap();
        assert!(!cached);
    }
}
