//! Messaging blob channel over the Telegram Bot API
//!
//! Files are uploaded with `sendDocument` and addressed by the returned
//! `file_id`; the locator has no relation to the file path.

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::models::{basename, Channel, StorageLocator, TelegramChannelConfig};
use crate::storage::{StorageChannel, StorageError, StorageResult};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 100;
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    document: Option<Attachment>,
    video: Option<Attachment>,
    audio: Option<Attachment>,
    animation: Option<Attachment>,
    #[serde(default)]
    photo: Vec<Attachment>,
}

impl SentMessage {
    fn file_id(&self) -> Option<&str> {
        self.document
            .as_ref()
            .or(self.video.as_ref())
            .or(self.audio.as_ref())
            .or(self.animation.as_ref())
            .or(self.photo.last())
            .map(|a| a.file_id.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct Attachment {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    file_path: Option<String>,
}

enum CallError {
    RateLimited(u64, String),
    Transient(String),
    Fatal(StorageError),
}

pub struct TelegramService {
    client: reqwest::Client,
    config: TelegramChannelConfig,
}

impl TelegramService {
    pub fn new(config: TelegramChannelConfig) -> anyhow::Result<Self> {
        if config.bot_token.is_empty() {
            return Err(anyhow!("Telegram bot token is required"));
        }
        if config.chat_id.is_empty() {
            return Err(anyhow!("Telegram chat id is required"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, config })
    }

    fn api_base(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base(), self.config.bot_token, method)
    }

    fn download_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base(), self.config.bot_token, file_path)
    }

    fn messaging_parts(locator: &StorageLocator) -> StorageResult<(&str, &str, Option<i64>)> {
        match locator {
            StorageLocator::Messaging {
                chat_id,
                file_id,
                message_id,
            } => Ok((chat_id, file_id, *message_id)),
            other => Err(StorageError::LocatorMismatch {
                expected: Channel::MessagingBlob,
                found: other.channel(),
            }),
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CallError> {
        let status = response.status();
        let body: ApiResponse<T> = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_server_error() => {
                return Err(CallError::Transient(format!("HTTP {}: {}", status, e)))
            }
            Err(e) => {
                return Err(CallError::Fatal(StorageError::Backend(anyhow!(
                    "Unreadable Bot API response (HTTP {}): {}",
                    status,
                    e
                ))))
            }
        };

        if body.ok {
            if let Some(result) = body.result {
                return Ok(result);
            }
        }

        let code = body.error_code.unwrap_or(status.as_u16());
        let description = body
            .description
            .unwrap_or_else(|| format!("Bot API request failed with HTTP {}", status));

        if code == 429 {
            let retry_after = body
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(CallError::RateLimited(retry_after, description));
        }
        if code >= 500 {
            return Err(CallError::Transient(description));
        }

        let lowered = description.to_lowercase();
        if lowered.contains("file not found")
            || lowered.contains("wrong file_id")
            || lowered.contains("invalid file_id")
            || lowered.contains("message to delete not found")
        {
            return Err(CallError::Fatal(StorageError::NotFound(description)));
        }
        Err(CallError::Fatal(StorageError::Backend(anyhow!(description))))
    }

    /// Retry wrapper with exponential backoff; a 429 waits for `retry_after`
    async fn call<T, F, Fut>(&self, operation_name: &str, operation: F) -> StorageResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CallError>>,
    {
        let mut attempt = 0;
        loop {
            let (delay, reason) = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Telegram operation '{}' succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(CallError::Fatal(e)) => return Err(e),
                Err(CallError::RateLimited(secs, reason)) => (Duration::from_secs(secs), reason),
                Err(CallError::Transient(reason)) => {
                    (Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt)), reason)
                }
            };

            if attempt >= MAX_RETRIES {
                error!(
                    "Telegram operation '{}' failed after {} attempts: {}",
                    operation_name,
                    MAX_RETRIES + 1,
                    reason
                );
                return Err(StorageError::Backend(anyhow!(reason)));
            }
            warn!(
                "Telegram operation '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                operation_name,
                attempt + 1,
                MAX_RETRIES + 1,
                delay,
                reason
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, CallError> {
        request
            .send()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))
    }
}

#[async_trait]
impl StorageChannel for TelegramService {
    fn channel(&self) -> Channel {
        Channel::MessagingBlob
    }

    fn storage_type(&self) -> &'static str {
        "telegram"
    }

    fn path_addressed(&self) -> bool {
        false
    }

    async fn initialize(&self) -> StorageResult<()> {
        #[derive(Deserialize)]
        struct BotUser {
            username: Option<String>,
        }

        let me: BotUser = self
            .call("getMe", || async move {
                let response = self.send(self.client.get(self.method_url("getMe"))).await?;
                Self::parse(response).await
            })
            .await?;
        info!(
            "Telegram channel initialized for bot {}",
            me.username.as_deref().unwrap_or("<unnamed>")
        );
        Ok(())
    }

    async fn get(&self, locator: &StorageLocator) -> StorageResult<Vec<u8>> {
        let (_, file_id, _) = Self::messaging_parts(locator)?;

        let remote: RemoteFile = self
            .call(&format!("getFile: {}", file_id), || async move {
                let request = self
                    .client
                    .get(self.method_url("getFile"))
                    .query(&[("file_id", file_id)]);
                let response = self.send(request).await?;
                Self::parse(response).await
            })
            .await?;

        let file_path = remote
            .file_path
            .ok_or_else(|| StorageError::NotFound(file_id.to_string()))?;
        let file_path = file_path.as_str();

        let bytes = self
            .call(&format!("download: {}", file_id), || async move {
                let response = self.send(self.client.get(self.download_url(file_path))).await?;
                let status = response.status();
                if status.as_u16() == 404 {
                    return Err(CallError::Fatal(StorageError::NotFound(file_id.to_string())));
                }
                if status.is_server_error() {
                    return Err(CallError::Transient(format!("HTTP {}", status)));
                }
                if !status.is_success() {
                    return Err(CallError::Fatal(StorageError::Backend(anyhow!(
                        "Download of {} failed with HTTP {}",
                        file_id,
                        status
                    ))));
                }
                response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| CallError::Transient(e.to_string()))
            })
            .await?;

        info!("Retrieved file {} from Telegram ({} bytes)", file_id, bytes.len());
        Ok(bytes)
    }

    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<StorageLocator> {
        let file_name = basename(path);
        let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();
        let mime = mime.as_str();
        let chat_id = self.config.chat_id.as_str();

        let sent: SentMessage = self
            .call(&format!("sendDocument: {}", path), || async move {
                let part = Part::bytes(data.to_vec())
                    .file_name(file_name.to_string())
                    .mime_str(mime)
                    .map_err(|e| CallError::Fatal(StorageError::Backend(e.into())))?;
                let form = Form::new()
                    .text("chat_id", chat_id.to_string())
                    .part("document", part);
                let response = self
                    .send(self.client.post(self.method_url("sendDocument")).multipart(form))
                    .await?;
                Self::parse(response).await
            })
            .await?;

        let file_id = sent.file_id().ok_or_else(|| {
            StorageError::Backend(anyhow!("sendDocument for {} returned no file id", path))
        })?;

        info!("Uploaded {} to Telegram as message {}", path, sent.message_id);
        Ok(StorageLocator::Messaging {
            chat_id: self.config.chat_id.clone(),
            file_id: file_id.to_string(),
            message_id: Some(sent.message_id),
        })
    }

    async fn delete(&self, locator: &StorageLocator) -> StorageResult<()> {
        let (chat_id, file_id, message_id) = Self::messaging_parts(locator)?;
        let Some(message_id) = message_id else {
            warn!("No message id recorded for Telegram file {}; leaving the message in place", file_id);
            return Ok(());
        };

        let result = self
            .call(&format!("deleteMessage: {}", message_id), || async move {
                let request = self
                    .client
                    .post(self.method_url("deleteMessage"))
                    .json(&json!({"chat_id": chat_id, "message_id": message_id}));
                let response = self.send(request).await?;
                Self::parse::<bool>(response).await
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                info!("Telegram message {} already deleted", message_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> TelegramService {
        TelegramService::new(TelegramChannelConfig {
            bot_token: "TOKEN".to_string(),
            chat_id: "-100123".to_string(),
            api_url: server.uri(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_returns_messaging_locator() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendDocument"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 42, "document": {"file_id": "BQAD-file"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let locator = service(&server).put("albums/cat.jpg", b"jpeg").await.unwrap();
        assert_eq!(
            locator,
            StorageLocator::Messaging {
                chat_id: "-100123".into(),
                file_id: "BQAD-file".into(),
                message_id: Some(42),
            }
        );
    }

    #[tokio::test]
    async fn test_get_resolves_file_path_then_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getFile"))
            .and(query_param("file_id", "BQAD-file"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_id": "BQAD-file", "file_path": "documents/file_7.jpg"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file/botTOKEN/documents/file_7.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
            .mount(&server)
            .await;

        let locator = StorageLocator::Messaging {
            chat_id: "-100123".into(),
            file_id: "BQAD-file".into(),
            message_id: Some(42),
        };
        assert_eq!(service(&server).get(&locator).await.unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_get_maps_unknown_file_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getFile"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: wrong file_id or the file is temporarily unavailable"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let locator = StorageLocator::Messaging {
            chat_id: "-100123".into(),
            file_id: "gone".into(),
            message_id: None,
        };
        let err = service(&server).get(&locator).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/deleteMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 0",
                "parameters": {"retry_after": 0}
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/deleteMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .with_priority(2)
            .expect(1)
            .mount(&server)
            .await;

        let locator = StorageLocator::Messaging {
            chat_id: "-100123".into(),
            file_id: "BQAD-file".into(),
            message_id: Some(42),
        };
        service(&server).delete(&locator).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_of_missing_message_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/deleteMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message to delete not found"
            })))
            .mount(&server)
            .await;

        let locator = StorageLocator::Messaging {
            chat_id: "-100123".into(),
            file_id: "BQAD-file".into(),
            message_id: Some(7),
        };
        service(&server).delete(&locator).await.unwrap();
    }

    #[test]
    fn test_requires_credentials() {
        let result = TelegramService::new(TelegramChannelConfig {
            bot_token: String::new(),
            chat_id: "1".into(),
            api_url: "https://api.telegram.org".into(),
        });
        assert!(result.is_err());
    }
}
