//! In-memory adapter for tests and dry runs

use async_trait::async_trait;
use feed_relay_domain::{
    AdapterCredentials, AuthError, AuthState, PlatformAdapter, PublishError, RemoteStatus,
    TokenGrant,
};
use secrecy::SecretString;
use std::sync::{Mutex, PoisonError};

/// A posting call captured by [`StubAdapter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCall {
    pub operation: &'static str,
    pub content: String,
    /// Original id, media URL or media length, depending on the operation
    pub extra: Option<String>,
}

/// Adapter that records calls instead of posting
pub struct StubAdapter {
    name: String,
    failure: Option<String>,
    calls: Mutex<Vec<StubCall>>,
}

impl StubAdapter {
    pub const PLATFORM: &'static str = "stub";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: None,
            calls: Mutex::new(vec![]),
        }
    }

    /// Stub whose every posting call fails with a network error
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(name)
        }
    }

    /// All calls recorded so far
    pub fn calls(&self) -> Vec<StubCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(
        &self,
        operation: &'static str,
        content: &str,
        extra: Option<String>,
    ) -> Result<RemoteStatus, PublishError> {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.push(StubCall {
            operation,
            content: content.to_string(),
            extra,
        });

        if let Some(message) = &self.failure {
            return Err(PublishError::Network(message.clone()));
        }

        let id = format!("stub_{}", calls.len());
        Ok(RemoteStatus {
            url: format!("stub://{}/{}", self.name, id),
            id,
            timestamp: None,
        })
    }
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
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
        format!("stub://{}/authorize", self.name)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        Ok(TokenGrant {
            access_token: SecretString::new(format!("stub-token-{}", code).into()),
            refresh_token: None,
            openid: None,
            expires_at: None,
        })
    }

    async fn post(&self, content: &str) -> Result<RemoteStatus, PublishError> {
        self.record("post", content, None)
    }

    async fn repost(
        &self,
        content: &str,
        original_id: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.record("repost", content, Some(original_id.to_string()))
    }

    async fn upload_by_url(
        &self,
        content: &str,
        media_url: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.record("upload_by_url", content, Some(media_url.to_string()))
    }

    async fn upload_by_data(
        &self,
        content: &str,
        media: Vec<u8>,
    ) -> Result<RemoteStatus, PublishError> {
        self.record("upload_by_data", content, Some(media.len().to_string()))
    }
}
