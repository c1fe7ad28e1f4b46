//! Feed source adapters

mod json;
mod rss_feed;

pub use self::json::JsonFeedSource;
pub use self::rss_feed::RssFeedSource;

use async_trait::async_trait;
use feed_relay_domain::{FeedItem, FeedSource, FeedSourceError};

/// Stub feed source for testing
pub struct StubFeedSource {
    name: String,
    items: Vec<FeedItem>,
}

impl StubFeedSource {
    /// Create an empty stub
    pub fn empty(name: impl Into<String>) -> Self {
        Self::with_items(name, vec![])
    }

    /// Create a stub with predefined items
    pub fn with_items(name: impl Into<String>, items: Vec<FeedItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

#[async_trait]
impl FeedSource for StubFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedSourceError> {
        Ok(self.items.clone())
    }
}
