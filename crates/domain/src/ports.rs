//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{AdapterCredentials, AuthState, FeedItem, RemoteStatus, TokenGrant};

/// Error type for feed source operations
#[derive(Debug, Error)]
pub enum FeedSourceError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for fetching items from a feed
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Source name, unique within a deployment
    fn name(&self) -> &str;

    /// Fetch the items currently available, oldest first
    async fn fetch(&self) -> Result<Vec<FeedItem>, FeedSourceError>;
}

/// Error type for the OAuth2 flow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Remote rejected authorization: {0}")]
    Remote(String),
    #[error("No access token in response")]
    MissingToken,
    #[error("Access token expired and could not be refreshed: {0}")]
    Expired(String),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("No pending authorization request; generate an authorization URL first")]
    NoPendingAuthorization,
    #[error("Network error: {0}")]
    Network(String),
}

/// Error type for posting operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Platform error {code}: {message}")]
    Platform { code: i64, message: String },
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited by platform")]
    RateLimited,
    #[error("Content too long: {len} chars (max {max})")]
    ContentTooLong { len: usize, max: usize },
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Operation not supported by {0}")]
    Unsupported(&'static str),
}

/// Port for one OAuth2-authenticated posting target
///
/// Posting calls never retry and never mutate credential state on failure;
/// the only state transitions happen in `authorize_url`, `exchange_code` and
/// the implicit refresh of an expired token.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Target name, unique within a deployment
    fn name(&self) -> &str;

    /// Platform identifier (e.g., "qq_weibo", "x")
    fn platform(&self) -> &'static str;

    fn auth_state(&self) -> AuthState;

    /// Snapshot of the current credentials
    fn credentials(&self) -> AdapterCredentials;

    /// URL a human opens to grant access; moves the adapter to `PendingCode`
    fn authorize_url(&self) -> String;

    /// Trade an authorization code for token state
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError>;

    async fn post(&self, content: &str) -> Result<RemoteStatus, PublishError>;

    async fn repost(&self, content: &str, original_id: &str)
    -> Result<RemoteStatus, PublishError>;

    async fn upload_by_url(
        &self,
        content: &str,
        media_url: &str,
    ) -> Result<RemoteStatus, PublishError>;

    async fn upload_by_data(
        &self,
        content: &str,
        media: Vec<u8>,
    ) -> Result<RemoteStatus, PublishError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
