//! Outbox adapter for human review.
//!
//! Every posting call is appended to a JSONL file instead of reaching a
//! platform.

use async_trait::async_trait;
use feed_relay_domain::{
    AdapterCredentials, AuthError, AuthState, PlatformAdapter, PublishError, RemoteStatus,
    TokenGrant,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    pub async fn new(path: PathBuf) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &OutboxEntry<'_>) -> Result<(), OutboxError> {
        let line = serde_json::to_string(entry)?;
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    id: &'a str,
    target: &'a str,
    operation: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_bytes: Option<usize>,
    written_at: String,
}

/// Target that records posts in an outbox file
#[derive(Debug, Clone)]
pub struct OutboxAdapter {
    name: String,
    writer: OutboxWriter,
}

impl OutboxAdapter {
    pub const PLATFORM: &'static str = "outbox";

    pub fn new(name: impl Into<String>, writer: OutboxWriter) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    async fn record(
        &self,
        operation: &str,
        content: &str,
        original_id: Option<&str>,
        media_url: Option<&str>,
        media_bytes: Option<usize>,
    ) -> Result<RemoteStatus, PublishError> {
        let id = Uuid::new_v4().to_string();
        let written_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let entry = OutboxEntry {
            id: &id,
            target: &self.name,
            operation,
            content,
            original_id,
            media_url,
            media_bytes,
            written_at: written_at.clone(),
        };

        self.writer.append(&entry).await.map_err(|error| {
            tracing::error!(adapter = %self.name, error = %error, "Outbox write failed");
            PublishError::Network(format!("Outbox write failed: {}", error))
        })?;

        Ok(RemoteStatus {
            url: format!("file://{}#{}", self.writer.path().display(), id),
            id,
            timestamp: Some(written_at),
        })
    }
}

#[async_trait]
impl PlatformAdapter for OutboxAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &'static str {
        Self::PLATFORM
    }

    fn auth_state(&self) -> AuthState {
        AuthState::Authenticated { expires_at: None }
    }

    fn credentials(&self) -> AdapterCredentials {
        AdapterCredentials::default()
    }

    fn authorize_url(&self) -> String {
        format!("file://{}", self.writer.path().display())
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, AuthError> {
        Err(AuthError::Remote(
            "outbox targets need no authorization".to_string(),
        ))
    }

    async fn post(&self, content: &str) -> Result<RemoteStatus, PublishError> {
        self.record("post", content, None, None, None).await
    }

    async fn repost(
        &self,
        content: &str,
        original_id: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.record("repost", content, Some(original_id), None, None)
            .await
    }

    async fn upload_by_url(
        &self,
        content: &str,
        media_url: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.record("upload_by_url", content, None, Some(media_url), None)
            .await
    }

    async fn upload_by_data(
        &self,
        content: &str,
        media: Vec<u8>,
    ) -> Result<RemoteStatus, PublishError> {
        self.record("upload_by_data", content, None, None, Some(media.len()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    async fn read_lines(path: &Path) -> Vec<Value> {
        let contents = tokio::fs::read_to_string(path).await.expect("read outbox");
        contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json"))
            .collect()
    }

    #[tokio::test]
    async fn outbox_adapter_writes_jsonl_entry() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("review").join("outbox.jsonl");

        let writer = OutboxWriter::new(path.clone()).await.expect("writer");
        let adapter = OutboxAdapter::new("review", writer);

        let status = adapter.post("Rendered content").await.expect("post");
        assert!(!status.id.is_empty());
        assert!(status.url.ends_with(&status.id));

        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["target"], "review");
        assert_eq!(lines[0]["operation"], "post");
        assert_eq!(lines[0]["content"], "Rendered content");
        assert!(lines[0].get("original_id").is_none());
    }

    #[tokio::test]
    async fn outbox_adapter_records_each_operation() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("outbox.jsonl");
        let adapter = OutboxAdapter::new(
            "review",
            OutboxWriter::new(path.clone()).await.expect("writer"),
        );

        adapter.repost("again", "42").await.expect("repost");
        adapter
            .upload_by_url("pic", "http://img/a.png")
            .await
            .expect("upload by url");
        adapter
            .upload_by_data("bytes", vec![0; 16])
            .await
            .expect("upload by data");

        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["operation"], "repost");
        assert_eq!(lines[0]["original_id"], "42");
        assert_eq!(lines[1]["media_url"], "http://img/a.png");
        assert_eq!(lines[2]["media_bytes"], 16);
    }

    #[tokio::test]
    async fn outbox_adapter_is_always_authenticated() {
        let dir = TempDir::new().expect("temp dir");
        let adapter = OutboxAdapter::new(
            "review",
            OutboxWriter::new(dir.path().join("o.jsonl"))
                .await
                .expect("writer"),
        );

        assert_eq!(
            adapter.auth_state(),
            AuthState::Authenticated { expires_at: None }
        );
        assert!(adapter.exchange_code("code").await.is_err());
        assert_eq!(
            adapter.auth_state(),
            AuthState::Authenticated { expires_at: None }
        );
    }
}
