//! Relay cycle - fetch, filter, and publish

use std::sync::Arc;

use crate::{
    filter::FilterChain,
    model::{FeedItem, PublishReport},
    ports::{FeedSource, PlatformAdapter},
    usecases::dispatch::{DispatchConfig, PublishDispatcher},
};

/// Configuration for the relay cycle
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Dry run mode (don't actually publish)
    pub dry_run: bool,
    pub dispatch: DispatchConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            dispatch: DispatchConfig::default(),
        }
    }
}

/// An item that went through the pipeline, with its per-target outcome
#[derive(Debug, Clone)]
pub struct RelayedItem {
    pub source: String,
    pub link: String,
    /// Content after filtering
    pub content: String,
    /// Empty in dry-run mode
    pub report: PublishReport,
}

/// Errors from the relay cycle
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("All {0} feed sources failed")]
    AllSourcesFailed(usize),
}

/// Relay orchestrator
pub struct Relay {
    sources: Vec<Arc<dyn FeedSource>>,
    chain: Arc<FilterChain>,
    targets: Vec<Arc<dyn PlatformAdapter>>,
    dispatcher: PublishDispatcher,
    config: RelayConfig,
}

impl Relay {
    pub fn new(
        sources: Vec<Arc<dyn FeedSource>>,
        chain: Arc<FilterChain>,
        targets: Vec<Arc<dyn PlatformAdapter>>,
        config: RelayConfig,
    ) -> Self {
        let dispatcher = PublishDispatcher::new(config.dispatch.clone());
        Self {
            sources,
            chain,
            targets,
            dispatcher,
            config,
        }
    }

    /// Run a single fetch-filter-publish cycle over every source
    pub async fn run_once(&self) -> Result<Vec<RelayedItem>, RelayError> {
        let mut relayed = Vec::new();
        let mut failures = 0;

        for source in &self.sources {
            let items = match source.fetch().await {
                Ok(items) => items,
                Err(e) => {
                    failures += 1;
                    tracing::error!(source = %source.name(), error = %e, "Failed to fetch feed");
                    // Continue with other sources
                    continue;
                }
            };

            if items.is_empty() {
                tracing::debug!(source = %source.name(), "No new items");
                continue;
            }

            tracing::info!(source = %source.name(), count = items.len(), "Fetched items");

            let filtered = self.chain.apply(items);
            for item in filtered {
                relayed.push(self.relay_item(source.name(), item).await);
            }
        }

        if !self.sources.is_empty() && failures == self.sources.len() {
            return Err(RelayError::AllSourcesFailed(failures));
        }

        Ok(relayed)
    }

    /// Publish a single item in source order
    async fn relay_item(&self, source: &str, item: FeedItem) -> RelayedItem {
        let report = if self.config.dry_run {
            tracing::info!(
                source = %source,
                link = %item.link,
                kind = ?item.kind(),
                content = %item.content,
                "[DRY RUN] Would publish"
            );
            PublishReport::default()
        } else {
            self.dispatcher.publish(&item, &self.targets).await
        };

        RelayedItem {
            source: source.to_string(),
            link: item.link,
            content: item.content,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterFactory, TemplateTruncateFilter};
    use crate::model::{AdapterCredentials, AuthState, RemoteStatus, TokenGrant};
    use crate::ports::{AuthError, FeedSourceError, PublishError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    struct FakeSource {
        name: String,
        items: Option<Vec<FeedItem>>,
    }

    #[async_trait]
    impl FeedSource for FakeSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self) -> Result<Vec<FeedItem>, FeedSourceError> {
            self.items
                .clone()
                .ok_or_else(|| FeedSourceError::Network("unreachable".to_string()))
        }
    }

    struct RecordingAdapter {
        posted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlatformAdapter for RecordingAdapter {
        fn name(&self) -> &str {
            "recorder"
        }

        fn platform(&self) -> &'static str {
            "fake"
        }

        fn auth_state(&self) -> AuthState {
            AuthState::Authenticated { expires_at: None }
        }

        fn credentials(&self) -> AdapterCredentials {
            AdapterCredentials::default()
        }

        fn authorize_url(&self) -> String {
            String::new()
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, AuthError> {
            Err(AuthError::MissingToken)
        }

        async fn post(&self, content: &str) -> Result<RemoteStatus, PublishError> {
            let mut posted = self.posted.lock().unwrap();
            posted.push(content.to_string());
            Ok(RemoteStatus {
                id: posted.len().to_string(),
                timestamp: None,
                url: format!("http://fake/{}", posted.len()),
            })
        }

        async fn repost(&self, content: &str, _id: &str) -> Result<RemoteStatus, PublishError> {
            self.post(content).await
        }

        async fn upload_by_url(
            &self,
            content: &str,
            _url: &str,
        ) -> Result<RemoteStatus, PublishError> {
            self.post(content).await
        }

        async fn upload_by_data(
            &self,
            content: &str,
            _media: Vec<u8>,
        ) -> Result<RemoteStatus, PublishError> {
            self.post(content).await
        }
    }

    fn item(title: &str) -> FeedItem {
        FeedItem {
            source: "feed".to_string(),
            title: title.to_string(),
            content: format!("{} body {{{{stub}}}}", title),
            link: format!("http://x/{}", title),
            published_at: OffsetDateTime::UNIX_EPOCH,
            media: None,
            repost_of: None,
        }
    }

    fn chain() -> Arc<FilterChain> {
        let factory = FilterFactory::with_builtin();
        Arc::new(
            factory
                .build_chain(&[
                    serde_json::json!({"type": "wiki-cleanup", "name": "wiki"}),
                    serde_json::json!({"type": "template-truncate", "name": "fmt", "format": "{{title}}: {{content}}"}),
                ])
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_run_once_filters_and_publishes_in_order() {
        let source = Arc::new(FakeSource {
            name: "feed".to_string(),
            items: Some(vec![item("one"), item("two")]),
        });
        let adapter = Arc::new(RecordingAdapter {
            posted: Mutex::new(vec![]),
        });

        let relay = Relay::new(
            vec![source],
            chain(),
            vec![adapter.clone()],
            RelayConfig {
                dry_run: false,
                ..Default::default()
            },
        );

        let relayed = relay.run_once().await.unwrap();

        assert_eq!(relayed.len(), 2);
        assert_eq!(relayed[0].content, "one: one body");
        assert!(relayed[0].report.get("recorder").unwrap().is_success());
        assert_eq!(
            *adapter.posted.lock().unwrap(),
            vec!["one: one body".to_string(), "two: two body".to_string()]
        );
    }

    #[tokio::test]
    async fn test_dry_run_does_not_publish() {
        let source = Arc::new(FakeSource {
            name: "feed".to_string(),
            items: Some(vec![item("one")]),
        });
        let adapter = Arc::new(RecordingAdapter {
            posted: Mutex::new(vec![]),
        });

        let relay = Relay::new(vec![source], chain(), vec![adapter.clone()], RelayConfig::default());

        let relayed = relay.run_once().await.unwrap();

        assert_eq!(relayed.len(), 1);
        assert!(relayed[0].report.is_empty());
        assert!(adapter.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_is_skipped() {
        let broken = Arc::new(FakeSource {
            name: "broken".to_string(),
            items: None,
        });
        let working = Arc::new(FakeSource {
            name: "working".to_string(),
            items: Some(vec![item("one")]),
        });

        let relay = Relay::new(
            vec![broken, working],
            Arc::new(FilterChain::default()),
            vec![],
            RelayConfig::default(),
        );

        let relayed = relay.run_once().await.unwrap();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].source, "working");
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_an_error() {
        let broken = Arc::new(FakeSource {
            name: "broken".to_string(),
            items: None,
        });

        let relay = Relay::new(
            vec![broken],
            Arc::new(FilterChain::default()),
            vec![],
            RelayConfig::default(),
        );

        assert!(matches!(
            relay.run_once().await,
            Err(RelayError::AllSourcesFailed(1))
        ));
    }

    #[test]
    fn test_template_filter_is_reusable_across_items() {
        let filter = TemplateTruncateFilter::new("f", "{{title}}", Some(5)).unwrap();
        let a = filter.render(&item("first")).unwrap();
        let b = filter.render(&item("second")).unwrap();
        assert_eq!(a, "first");
        assert_eq!(b, "seco…");
    }
}
