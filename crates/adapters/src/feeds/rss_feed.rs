//! RSS 2.0 feed source

use async_trait::async_trait;
use feed_relay_domain::{FeedItem, FeedSource, FeedSourceError, Media};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

/// Polls an RSS feed over HTTP
///
/// Links in the previous fetch are remembered, so repeated polls only yield
/// new entries. Only the latest channel's links are kept.
pub struct RssFeedSource {
    name: String,
    url: String,
    client: Client,
    seen: Mutex<HashSet<String>>,
}

impl RssFeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            name: name.into(),
            url: url.into(),
            client,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Convert a parsed channel into items, oldest first
    pub fn parse_channel(channel: &rss::Channel, source: &str) -> Vec<FeedItem> {
        let mut items: Vec<FeedItem> = channel
            .items()
            .iter()
            .filter_map(|item| {
                let link = item
                    .link()
                    .map(String::from)
                    .or_else(|| item.guid().map(|g| g.value().to_string()))?;

                let published_at = item
                    .pub_date()
                    .and_then(|d| OffsetDateTime::parse(d, &Rfc2822).ok())
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH);

                let media = item
                    .enclosure()
                    .filter(|e| e.mime_type().starts_with("image/"))
                    .map(|e| Media::Url(e.url().to_string()));

                Some(FeedItem {
                    source: source.to_string(),
                    title: item.title().unwrap_or_default().to_string(),
                    content: item
                        .content()
                        .or_else(|| item.description())
                        .unwrap_or_default()
                        .to_string(),
                    link,
                    published_at,
                    media,
                    repost_of: None,
                })
            })
            .collect();

        // Feeds list newest first; publishing happens in chronological order
        items.sort_by_key(|item| item.published_at);
        items
    }

    /// Items not in the previous fetch; remembers this fetch's links instead
    fn keep_unseen(&self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::take(&mut *seen);
        items
            .into_iter()
            .filter(|item| seen.insert(item.link.clone()) && !previous.contains(&item.link))
            .collect()
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedSourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedSourceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedSourceError::Network(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedSourceError::Network(e.to_string()))?;
        let channel = rss::Channel::read_from(body.as_ref())
            .map_err(|e| FeedSourceError::Parse(e.to_string()))?;

        let items = Self::parse_channel(&channel, &self.name);
        let total = items.len();
        let fresh = self.keep_unseen(items);
        tracing::debug!(source = %self.name, total, fresh = fresh.len(), "Parsed feed");
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <item>
      <title>Second Post</title>
      <link>https://example.com/2</link>
      <pubDate>Tue, 02 Jan 2024 12:00:00 +0000</pubDate>
      <description>Second description</description>
      <enclosure url="https://example.com/2.png" length="10" type="image/png"/>
    </item>
    <item>
      <title>First Post</title>
      <link>https://example.com/1</link>
      <pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
      <description>First description</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parse_channel_orders_oldest_first() {
        let channel = rss::Channel::read_from(FEED.as_bytes()).unwrap();
        let items = RssFeedSource::parse_channel(&channel, "blog");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First Post");
        assert_eq!(items[0].content, "First description");
        assert_eq!(items[0].source, "blog");
        assert!(items[0].media.is_none());
        assert_eq!(
            items[1].media,
            Some(Media::Url("https://example.com/2.png".to_string()))
        );
        assert!(items[0].published_at < items[1].published_at);
    }

    #[test]
    fn falls_back_to_guid_when_no_link() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <item>
      <title>No link</title>
      <guid>urn:post:7</guid>
    </item>
    <item>
      <title>Nothing to identify</title>
    </item>
  </channel>
</rss>"#;

        let channel = rss::Channel::read_from(xml.as_bytes()).unwrap();
        let items = RssFeedSource::parse_channel(&channel, "t");

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "urn:post:7");
        assert_eq!(items[0].published_at, OffsetDateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn fetch_skips_items_seen_before() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let source = RssFeedSource::new("blog", format!("{}/feed.xml", server.uri()));

        assert_eq!(source.fetch().await.unwrap().len(), 2);
        assert!(source.fetch().await.unwrap().is_empty());
    }

    #[test]
    fn seen_links_only_cover_latest_channel() {
        let source = RssFeedSource::new("blog", "http://unused");
        let channel = rss::Channel::read_from(FEED.as_bytes()).unwrap();
        let mut items = RssFeedSource::parse_channel(&channel, "blog");

        assert_eq!(source.keep_unseen(items.clone()).len(), 2);

        // Oldest entry falls off the feed, a new one arrives
        items.remove(0);
        let mut newer = items[0].clone();
        newer.link = "https://example.com/3".to_string();
        items.push(newer);

        let fresh = source.keep_unseen(items);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].link, "https://example.com/3");

        let seen = source.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains("https://example.com/1"));
    }

    #[tokio::test]
    async fn fetch_reports_http_and_parse_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/garbage.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not xml at all"))
            .mount(&server)
            .await;

        let missing = RssFeedSource::new("m", format!("{}/missing.xml", server.uri()));
        assert!(matches!(
            missing.fetch().await,
            Err(FeedSourceError::Network(_))
        ));

        let garbage = RssFeedSource::new("g", format!("{}/garbage.xml", server.uri()));
        assert!(matches!(
            garbage.fetch().await,
            Err(FeedSourceError::Parse(_))
        ));
    }
}
