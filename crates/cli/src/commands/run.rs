//! Run command - fetch, filter and publish loop

use anyhow::{Context, Result};
use feed_relay_adapters::{
    feeds::{JsonFeedSource, RssFeedSource},
    outbox::{OutboxAdapter, OutboxWriter},
    qq_weibo::{self, QqWeiboAdapter},
    stub::StubAdapter,
    x_api::{self, XAdapter},
};
use feed_relay_domain::{
    AdapterCredentials, FeedSource, PlatformAdapter, SystemClock,
    filter::{FilterChain, FilterFactory},
    usecases::{DispatchConfig, Relay, RelayConfig, RelayedItem},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::args::RunArgs;
use crate::config::{AppConfig, Platform, SourceConfig, SourceType, TargetConfig};

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let dry_run = args.dry_run || config.general.dry_run;

    tracing::info!(
        dry_run = dry_run,
        once = args.once,
        sources = config.sources.len(),
        targets = config.targets.len(),
        "Starting feed-relay run"
    );

    // Build dependencies
    let chain = Arc::new(build_filter_chain(&config)?);
    let sources = config.sources.iter().map(build_source).collect();

    let mut targets = Vec::with_capacity(config.targets.len());
    for target in &config.targets {
        targets.push(build_target(target, &config).await?);
    }

    let relay = Relay::new(
        sources,
        chain,
        targets,
        RelayConfig {
            dry_run,
            dispatch: dispatch_config(&config),
        },
    );

    // Execute
    if args.once {
        tracing::info!("Running single relay cycle");
        let relayed = relay.run_once().await?;
        tracing::info!(relayed = relayed.len(), "Relay cycle complete");
        log_outcomes(&relayed);
    } else {
        // Continuous polling loop
        let poll_interval = Duration::from_secs(config.general.poll_interval_secs);
        let mut ticker = interval(poll_interval);

        // Set up graceful shutdown
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        };

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match relay.run_once().await {
                        Ok(relayed) => {
                            if !relayed.is_empty() {
                                tracing::info!(relayed = relayed.len(), "Relay cycle complete");
                                log_outcomes(&relayed);
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Relay cycle failed");
                        }
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down gracefully");
                    break;
                }
            }
        }
    }

    tracing::info!("feed-relay run completed");
    Ok(())
}

fn log_outcomes(relayed: &[RelayedItem]) {
    for item in relayed {
        let failed = item.report.failed();
        if failed.is_empty() {
            tracing::info!(
                source = %item.source,
                link = %item.link,
                published = ?item.report.succeeded(),
                "Relayed"
            );
        } else {
            tracing::warn!(
                source = %item.source,
                link = %item.link,
                published = ?item.report.succeeded(),
                failed = ?failed,
                "Relayed with failures"
            );
        }
    }
}

pub(crate) fn dispatch_config(config: &AppConfig) -> DispatchConfig {
    DispatchConfig {
        call_timeout: Duration::from_secs(config.general.call_timeout_secs),
        cycle_deadline: Duration::from_secs(config.general.cycle_deadline_secs),
    }
}

/// Build the filter chain; only template compile errors are fatal
pub(crate) fn build_filter_chain(config: &AppConfig) -> Result<FilterChain> {
    let factory = FilterFactory::with_builtin();
    let chain = factory
        .build_chain(&config.filters)
        .context("Failed to build filter chain")?;

    for skipped in chain.skipped() {
        tracing::warn!(filter = %skipped.name, reason = %skipped.reason, "Filter skipped");
    }
    tracing::info!(filters = ?chain.names(), "Filter chain ready");

    Ok(chain)
}

fn build_source(source: &SourceConfig) -> Arc<dyn FeedSource> {
    match source.kind {
        SourceType::Rss => Arc::new(RssFeedSource::new(
            &source.name,
            source.url.clone().unwrap_or_default(),
        )),
        SourceType::Json => Arc::new(JsonFeedSource::new(
            &source.name,
            source.path.clone().unwrap_or_default(),
        )),
    }
}

pub(crate) async fn build_target(
    target: &TargetConfig,
    config: &AppConfig,
) -> Result<Arc<dyn PlatformAdapter>> {
    build_target_with(target, target.credentials(), config).await
}

/// Build a target adapter starting from the given credentials
pub(crate) async fn build_target_with(
    target: &TargetConfig,
    credentials: AdapterCredentials,
    config: &AppConfig,
) -> Result<Arc<dyn PlatformAdapter>> {
    let timeout = Duration::from_secs(config.general.call_timeout_secs);

    let adapter: Arc<dyn PlatformAdapter> = match target.platform {
        Platform::QqWeibo => Arc::new(QqWeiboAdapter::with_options(
            &target.name,
            credentials,
            target
                .auth_base
                .clone()
                .unwrap_or_else(|| qq_weibo::DEFAULT_AUTH_BASE.to_string()),
            target
                .api_base
                .clone()
                .unwrap_or_else(|| qq_weibo::DEFAULT_API_BASE.to_string()),
            timeout,
            Arc::new(SystemClock),
        )),
        Platform::X => Arc::new(XAdapter::with_base_url(
            &target.name,
            credentials,
            target
                .auth_base
                .clone()
                .unwrap_or_else(|| x_api::DEFAULT_AUTHORIZE_URL.to_string()),
            target
                .api_base
                .clone()
                .unwrap_or_else(|| x_api::DEFAULT_API_BASE.to_string()),
            target.max_chars,
            timeout,
            Arc::new(SystemClock),
        )),
        Platform::Outbox => {
            let path = target.path.clone().unwrap_or_else(default_outbox_path);
            let writer = OutboxWriter::new(path.clone())
                .await
                .context("Failed to initialize outbox writer")?;
            tracing::info!(
                adapter = %target.name,
                outbox = %path.display(),
                "Writing posts to outbox"
            );
            Arc::new(OutboxAdapter::new(&target.name, writer))
        }
        Platform::Stub => Arc::new(StubAdapter::new(&target.name)),
    };

    tracing::debug!(
        adapter = %adapter.name(),
        platform = adapter.platform(),
        auth_state = ?adapter.auth_state(),
        "Target ready"
    );

    Ok(adapter)
}

fn default_outbox_path() -> PathBuf {
    PathBuf::from("./outbox.jsonl")
}
