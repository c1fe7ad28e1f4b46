//! Publish dispatch - independent, bounded posting across all targets

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};

use crate::model::{FeedItem, Media, PublishReport, PublishResult, RemoteStatus};
use crate::ports::{PlatformAdapter, PublishError};

/// Timeouts applied by the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on a single posting call
    pub call_timeout: Duration,
    /// Upper bound on publishing one item to every target
    pub cycle_deadline: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            cycle_deadline: Duration::from_secs(90),
        }
    }
}

/// Publishes one item to every target concurrently
///
/// A failure, error or timeout on one target is recorded in the report and
/// never prevents the call to, or the result of, any other target.
#[derive(Debug, Clone, Default)]
pub struct PublishDispatcher {
    config: DispatchConfig,
}

impl PublishDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    pub async fn publish(
        &self,
        item: &FeedItem,
        targets: &[Arc<dyn PlatformAdapter>],
    ) -> PublishReport {
        let deadline = Instant::now() + self.config.cycle_deadline;
        let mut report = PublishReport::default();

        let mut pending: FuturesUnordered<_> = targets
            .iter()
            .map(|target| async move {
                let result = self.call(target.as_ref(), item).await;
                (target.name().to_string(), result)
            })
            .collect();

        let collected = timeout_at(deadline, async {
            while let Some((name, result)) = pending.next().await {
                report.insert(name, result);
            }
        })
        .await;
        drop(pending);

        if collected.is_err() {
            for target in targets {
                if report.get(target.name()).is_none() {
                    tracing::warn!(
                        adapter = %target.name(),
                        link = %item.link,
                        "Publish deadline reached before target finished"
                    );
                    report.insert(
                        target.name(),
                        PublishResult::Failed {
                            error: PublishError::Timeout(self.config.cycle_deadline).to_string(),
                        },
                    );
                }
            }
        }

        report
    }

    async fn call(&self, target: &dyn PlatformAdapter, item: &FeedItem) -> PublishResult {
        let kind = item.kind();
        match timeout(self.config.call_timeout, invoke(target, item)).await {
            Ok(Ok(status)) => {
                tracing::info!(
                    adapter = %target.name(),
                    platform = target.platform(),
                    kind = ?kind,
                    remote_id = %status.id,
                    url = %status.url,
                    "Published item"
                );
                status.into()
            }
            Ok(Err(e)) => {
                tracing::error!(
                    adapter = %target.name(),
                    platform = target.platform(),
                    kind = ?kind,
                    error = %e,
                    "Failed to publish item"
                );
                PublishResult::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                let e = PublishError::Timeout(self.config.call_timeout);
                tracing::error!(
                    adapter = %target.name(),
                    platform = target.platform(),
                    kind = ?kind,
                    error = %e,
                    "Publishing call timed out"
                );
                PublishResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Pick the posting operation that matches the item
async fn invoke(
    target: &dyn PlatformAdapter,
    item: &FeedItem,
) -> Result<RemoteStatus, PublishError> {
    match (&item.media, &item.repost_of) {
        (Some(Media::Url(url)), _) => target.upload_by_url(&item.content, url).await,
        (Some(Media::Data(data)), _) => target.upload_by_data(&item.content, data.clone()).await,
        (None, Some(original_id)) => target.repost(&item.content, original_id).await,
        (None, None) => target.post(&item.content).await,
    }
}
