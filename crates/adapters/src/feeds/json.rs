//! JSON file feed source

use async_trait::async_trait;
use feed_relay_domain::{FeedItem, FeedSource, FeedSourceError};
use std::path::{Path, PathBuf};

/// Reads a JSON array of items from disk on every fetch
pub struct JsonFeedSource {
    name: String,
    path: PathBuf,
}

impl JsonFeedSource {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl FeedSource for JsonFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedSourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let mut items: Vec<FeedItem> = serde_json::from_str(&raw).map_err(|e| {
            FeedSourceError::Parse(format!("{}: {}", self.path.display(), e))
        })?;

        for item in &mut items {
            if item.source.is_empty() {
                item.source = self.name.clone();
            }
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_relay_domain::Media;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_items_and_fills_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(
            &path,
            r#"[
                {"title": "A", "content": "hello", "link": "http://a", "published_at": "2024-01-01T00:00:00Z"},
                {"source": "other", "title": "B", "content": "pic", "link": "http://b",
                 "published_at": "2024-01-02T00:00:00Z", "media": {"url": "http://img"}, "repost_of": "9"}
            ]"#,
        )
        .unwrap();

        let items = JsonFeedSource::new("local", &path).fetch().await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, "local");
        assert_eq!(items[1].source, "other");
        assert_eq!(items[1].media, Some(Media::Url("http://img".to_string())));
        assert_eq!(items[1].repost_of.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let source = JsonFeedSource::new("local", dir.path().join("nope.json"));
        assert!(matches!(source.fetch().await, Err(FeedSourceError::Io(_))));
    }

    #[tokio::test]
    async fn malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let source = JsonFeedSource::new("local", &path);
        assert!(matches!(source.fetch().await, Err(FeedSourceError::Parse(_))));
    }
}
