// Re-export all model types for ease of use

pub mod batch;
pub mod channel;
pub mod favorite;
pub mod file;
pub mod folder;
pub mod index;
pub mod search;
pub mod stats;
pub mod tag;

pub use batch::*;
pub use channel::{S3ChannelConfig, TelegramChannelConfig};
pub use favorite::*;
pub use file::{
    basename, decode_file_id, parent_dir, Channel, FileKind, FileMetadata, FileRecord,
    StorageLocator, DEFAULT_S3_PROFILE,
};
pub use folder::*;
pub use search::*;
pub use stats::*;
pub use tag::*;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

/// Generic `{success, message}` body
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Record ids: `<prefix>_<base36 millis>_<random>`
pub fn generate_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, to_base36(millis), &random[..9])
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = generate_id("tag");
        let b = generate_id("tag");
        assert!(a.starts_with("tag_"));
        assert_eq!(a.split('_').count(), 3);
        assert_ne!(a, b);
    }
}
