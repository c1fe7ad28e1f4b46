//! Domain models and value objects

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Media attached to a feed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Media {
    /// Remote image the platform fetches itself
    Url(String),
    /// Raw image bytes uploaded with the post
    Data(Vec<u8>),
}

/// One unit of ingested content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Name of the source that produced this item
    #[serde(default)]
    pub source: String,
    pub title: String,
    /// Body content; filters rewrite this field
    pub content: String,
    /// Canonical link to the original entry
    pub link: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    #[serde(default)]
    pub media: Option<Media>,
    /// Remote status id this item quotes, if any
    #[serde(default)]
    pub repost_of: Option<String>,
}

impl FeedItem {
    /// Copy of this item with different content
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// Which posting operation this item maps to
    pub fn kind(&self) -> ItemKind {
        match (&self.media, &self.repost_of) {
            (Some(Media::Url(_)), _) => ItemKind::MediaUrl,
            (Some(Media::Data(_)), _) => ItemKind::MediaData,
            (None, Some(_)) => ItemKind::Repost,
            (None, None) => ItemKind::Text,
        }
    }
}

/// Posting operation selected for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Text,
    Repost,
    MediaUrl,
    MediaData,
}

/// Outstanding authorization request, kept until the code comes back
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// Opaque value the platform echoes back on the redirect
    pub state: String,
    /// PKCE verifier, for platforms that use one
    pub code_verifier: Option<SecretString>,
}

impl PendingAuthorization {
    /// Whether a state echoed back on the redirect belongs to this request
    pub fn matches_state(&self, state: &str) -> bool {
        self.state == state
    }
}

/// OAuth2 application and token state for one target
#[derive(Debug, Clone, Default)]
pub struct AdapterCredentials {
    /// Application key (`client_id`)
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: String,
    pub access_token: Option<SecretString>,
    /// Absolute expiry of the access token
    pub expires_in: Option<OffsetDateTime>,
    pub refresh_token: Option<SecretString>,
    /// Platform-assigned user identifier
    pub openid: Option<String>,
    /// Caller network address reported to platforms that require one
    pub client_ip: Option<String>,
    pub pending: Option<PendingAuthorization>,
}

impl AdapterCredentials {
    pub fn client_secret(&self) -> &str {
        expose(&self.client_secret).unwrap_or_default()
    }

    pub fn access_token(&self) -> Option<&str> {
        expose(&self.access_token).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        expose(&self.refresh_token).filter(|t| !t.is_empty())
    }

    /// Whether the access token is present and not past its expiry
    pub fn has_valid_token(&self, now: OffsetDateTime) -> bool {
        match (self.access_token(), self.expires_in) {
            (Some(_), Some(expiry)) => now < expiry,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Drop every piece of token state, keeping application settings
    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.expires_in = None;
        self.refresh_token = None;
        self.openid = None;
        self.pending = None;
    }
}

fn expose(secret: &Option<SecretString>) -> Option<&str> {
    secret.as_ref().map(|s| s.expose_secret())
}

/// Token state returned by a successful code exchange or refresh
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub openid: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Authentication state of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Authorization URL handed out, waiting for the callback code
    PendingCode,
    Authenticated { expires_at: Option<OffsetDateTime> },
}

/// A status created on a remote platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub id: String,
    pub timestamp: Option<String>,
    /// Canonical public URL of the status
    pub url: String,
}

/// Outcome of publishing one item to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishResult {
    Published { id: String, url: String },
    Failed { error: String },
}

impl PublishResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

impl From<RemoteStatus> for PublishResult {
    fn from(status: RemoteStatus) -> Self {
        Self::Published {
            id: status.id,
            url: status.url,
        }
    }
}

/// Per-target results for one item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub results: BTreeMap<String, PublishResult>,
}

impl PublishReport {
    pub fn insert(&mut self, target: impl Into<String>, result: PublishResult) {
        self.results.insert(target.into(), result);
    }

    pub fn get(&self, target: &str) -> Option<&PublishResult> {
        self.results.get(target)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Names of targets that accepted the item
    pub fn succeeded(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of targets that failed
    pub fn failed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| !r.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
