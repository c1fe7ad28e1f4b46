//! X (Twitter) API adapter
//!
//! Uses OAuth 2.0 authorization code flow with PKCE (S256) and bearer user tokens.

mod write;

use feed_relay_domain::{AdapterCredentials, AuthError, Clock, SystemClock, TokenGrant};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::oauth::{TokenCell, grant_from_fields};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://x.com/i/oauth2/authorize";
pub const DEFAULT_API_BASE: &str = "https://api.x.com";
const SCOPES: &str = "tweet.read tweet.write users.read media.write offline.access";

/// X API adapter
pub struct XAdapter {
    name: String,
    client: Client,
    authorize_base: String,
    api_base: String,
    max_chars: usize,
    tokens: TokenCell,
}

impl XAdapter {
    pub const PLATFORM: &'static str = "x";

    pub fn new(name: impl Into<String>, credentials: AdapterCredentials, max_chars: usize) -> Self {
        Self::with_base_url(
            name,
            credentials,
            DEFAULT_AUTHORIZE_URL.to_string(),
            DEFAULT_API_BASE.to_string(),
            max_chars,
            Duration::from_secs(30),
            Arc::new(SystemClock),
        )
    }

    pub fn with_base_url(
        name: impl Into<String>,
        credentials: AdapterCredentials,
        authorize_base: String,
        api_base: String,
        max_chars: usize,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            name: name.into(),
            client,
            authorize_base,
            api_base: api_base.trim_end_matches('/').to_string(),
            max_chars,
            tokens: TokenCell::new(credentials, clock),
        }
    }

    /// Public URL of a post
    pub fn status_url(id: &str) -> String {
        format!("https://x.com/i/status/{}", id)
    }

    async fn request_token(
        &self,
        creds: &AdapterCredentials,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, AuthError> {
        let url = format!("{}/2/oauth2/token", self.api_base);
        let mut request = self.client.post(&url).form(params);
        if !creds.client_secret().is_empty() {
            request = request.basic_auth(&creds.client_id, Some(creds.client_secret()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let token: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            if status.is_success() {
                AuthError::MissingToken
            } else {
                AuthError::Remote(format!("HTTP {}: {}", status, body))
            }
        })?;

        let error = token
            .error
            .map(|e| match token.error_description {
                Some(description) => format!("{}: {}", e, description),
                None => e,
            });

        grant_from_fields(
            error.as_deref(),
            token.access_token.as_deref(),
            token.refresh_token.as_deref(),
            None,
            token.expires_in,
            self.tokens.now(),
        )
    }

    async fn refresh(&self, current: AdapterCredentials) -> Result<TokenGrant, AuthError> {
        self.request_token(
            &current,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token().unwrap_or_default()),
                ("client_id", current.client_id.as_str()),
            ],
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}
