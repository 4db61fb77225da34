use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Physical backend holding a file's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Channel {
    #[serde(rename = "CloudflareR2", alias = "ObjectStore")]
    ObjectStore,
    #[serde(rename = "S3")]
    S3,
    #[serde(rename = "Telegram", alias = "TelegramNew", alias = "MessagingBlob")]
    MessagingBlob,
    /// Any channel name this build does not manage; such files are metadata-only
    #[default]
    #[serde(other)]
    Unknown,
}

impl Channel {
    /// Channel of a name as written in a file record
    pub fn from_stored(name: &str) -> Channel {
        match name {
            "CloudflareR2" | "ObjectStore" => Channel::ObjectStore,
            "S3" => Channel::S3,
            "Telegram" | "TelegramNew" | "MessagingBlob" => Channel::MessagingBlob,
            _ => Channel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::ObjectStore => "CloudflareR2",
            Channel::S3 => "S3",
            Channel::MessagingBlob => "Telegram",
            Channel::Unknown => "Unknown",
        }
    }

    /// Parse a channel name as it appears in query strings
    pub fn parse(value: &str) -> Option<Channel> {
        match value.to_ascii_lowercase().as_str() {
            "cloudflarer2" | "r2" | "objectstore" => Some(Channel::ObjectStore),
            "s3" => Some(Channel::S3),
            "telegram" | "telegramnew" | "messagingblob" => Some(Channel::MessagingBlob),
            "unknown" => Some(Channel::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_S3_PROFILE: &str = "default";

fn default_s3_profile() -> String {
    DEFAULT_S3_PROFILE.to_string()
}

/// Where a channel keeps the bytes of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageLocator {
    Bucket {
        key: String,
    },
    S3 {
        #[serde(default)]
        bucket: String,
        key: String,
        /// Name of the configured credentials, never the credentials themselves
        #[serde(default = "default_s3_profile")]
        profile: String,
    },
    Messaging {
        chat_id: String,
        file_id: String,
        #[serde(default)]
        message_id: Option<i64>,
    },
}

impl StorageLocator {
    pub fn channel(&self) -> Channel {
        match self {
            StorageLocator::Bucket { .. } => Channel::ObjectStore,
            StorageLocator::S3 { .. } => Channel::S3,
            StorageLocator::Messaging { .. } => Channel::MessagingBlob,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Int(n)) => Some(n),
        Some(Lenient::Float(n)) => Some(n as i64),
        Some(Lenient::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Metadata half of a file record. Field names follow the upload pipeline's
/// PascalCase convention; unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Size in megabytes, kept in whatever form it was stored (usually a
    /// string such as `"0.52"`); read it through [`FileMetadata::file_size`]
    #[serde(rename = "FileSize", default, skip_serializing_if = "Option::is_none")]
    pub file_size_raw: Option<Value>,
    /// Upload time, milliseconds since the epoch
    #[serde(
        rename = "TimeStamp",
        default,
        deserialize_with = "lenient_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
    /// Channel name as stored; names this build does not manage survive rewrites
    #[serde(rename = "Channel", default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<StorageLocator>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileMetadata {
    pub fn channel(&self) -> Channel {
        self.channel_name
            .as_deref()
            .map(Channel::from_stored)
            .unwrap_or_default()
    }

    /// The stored channel name, or `Unknown` when the record has none
    pub fn channel_label(&self) -> &str {
        self.channel_name.as_deref().unwrap_or("Unknown")
    }

    pub fn set_channel(&mut self, channel: Channel) {
        self.channel_name = Some(channel.as_str().to_string());
    }

    pub fn file_size(&self) -> Option<f64> {
        match self.file_size_raw.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Store a size in megabytes the way uploads write it: two decimals, as text
    pub fn set_file_size(&mut self, megabytes: f64) {
        self.file_size_raw = Some(Value::String(format!("{:.2}", megabytes)));
    }

    /// The locator recorded for this file. Records written before locators
    /// were stored fall back to the path (object bucket) or the legacy S3 keys.
    pub fn resolve_locator(&self, path: &str) -> Option<StorageLocator> {
        if let Some(locator) = &self.locator {
            return Some(locator.clone());
        }
        let legacy = |field: &str| self.extra.get(field).and_then(Value::as_str).map(str::to_string);
        match self.channel() {
            Channel::ObjectStore => Some(StorageLocator::Bucket {
                key: path.to_string(),
            }),
            Channel::S3 => Some(StorageLocator::S3 {
                bucket: legacy("S3BucketName").unwrap_or_default(),
                key: legacy("S3FileKey").unwrap_or_else(|| path.to_string()),
                profile: default_s3_profile(),
            }),
            Channel::MessagingBlob | Channel::Unknown => None,
        }
    }

    /// Point this metadata at a new path and locator. Every other field,
    /// including unrecognised ones, is kept as stored.
    pub fn relocate(&mut self, new_path: &str, locator: Option<StorageLocator>) {
        let folder = parent_dir(new_path).to_string();
        self.file_name = Some(new_path.to_string());
        self.directory = Some(folder.clone());
        self.extra.insert("Folder".into(), Value::String(folder));
        if let Some(StorageLocator::S3 { bucket, key, .. }) = &locator {
            self.extra.insert("S3BucketName".into(), Value::String(bucket.clone()));
            self.extra.insert("S3FileKey".into(), Value::String(key.clone()));
        }
        if locator.is_some() {
            self.locator = locator;
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A file as held by the metadata store: key is the full path
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: String,
    /// Stored value, usually empty; carried over verbatim on move and copy.
    /// Listings do not return values, so scanned records hold an empty string.
    pub value: String,
    pub metadata: FileMetadata,
}

impl FileRecord {
    pub fn display_name(&self) -> &str {
        basename(&self.path)
    }
}

/// Last path segment
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Everything before the last `/`, or empty for a top-level path
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// File ids arrive with `/` encoded as `,` and may be URI-encoded
pub fn decode_file_id(raw: &str) -> String {
    let joined = raw.split(',').collect::<Vec<_>>().join("/");
    urlencoding::decode(&joined)
        .map(|s| s.into_owned())
        .unwrap_or(joined)
}

/// Extension-based type families used by search filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl FileKind {
    pub fn of(path: &str) -> FileKind {
        let name = basename(path);
        let ext = match name.rfind('.') {
            Some(idx) => name[idx + 1..].to_ascii_lowercase(),
            None => return FileKind::Other,
        };
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "bmp" | "ico" => FileKind::Image,
            "mp4" | "avi" | "mov" | "wmv" | "flv" | "webm" | "mkv" | "3gp" => FileKind::Video,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "wma" | "m4a" => FileKind::Audio,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "txt" | "rtf" => {
                FileKind::Document
            }
            _ => FileKind::Other,
        }
    }

    pub fn parse(value: &str) -> Option<FileKind> {
        match value {
            "image" => Some(FileKind::Image),
            "video" => Some(FileKind::Video),
            "audio" => Some(FileKind::Audio),
            "document" => Some(FileKind::Document),
            "other" => Some(FileKind::Other),
            _ => None,
        }
    }
}
