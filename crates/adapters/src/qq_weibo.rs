//! Tencent Weibo (t.qq.com) open API adapter

use async_trait::async_trait;
use feed_relay_domain::{
    AdapterCredentials, AuthError, AuthState, Clock, PlatformAdapter, PublishError, RemoteStatus,
    SystemClock, TokenGrant,
};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::oauth::{TokenCell, new_pending, parse_query_token_response};

const OAUTH_VERSION: &str = "2.a";
const DEFAULT_CLIENT_IP: &str = "127.0.0.1";
pub const DEFAULT_AUTH_BASE: &str = "https://open.t.qq.com/cgi-bin/oauth2";
pub const DEFAULT_API_BASE: &str = "https://open.t.qq.com/api";

/// Tencent Weibo adapter
pub struct QqWeiboAdapter {
    name: String,
    client: Client,
    auth_base: String,
    api_base: String,
    tokens: TokenCell,
}

impl QqWeiboAdapter {
    pub const PLATFORM: &'static str = "qq_weibo";

    pub fn new(name: impl Into<String>, credentials: AdapterCredentials) -> Self {
        Self::with_options(
            name,
            credentials,
            DEFAULT_AUTH_BASE.to_string(),
            DEFAULT_API_BASE.to_string(),
            Duration::from_secs(30),
            Arc::new(SystemClock),
        )
    }

    pub fn with_options(
        name: impl Into<String>,
        credentials: AdapterCredentials,
        auth_base: String,
        api_base: String,
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
            auth_base: auth_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            tokens: TokenCell::new(credentials, clock),
        }
    }

    /// Public URL of a status
    pub fn status_url(id: &str) -> String {
        format!("http://t.qq.com/p/t/{}", id)
    }

    /// POST to the token endpoint and parse the query-string response
    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant, AuthError> {
        let url = format!("{}/access_token", self.auth_base);
        let response = self
            .client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        parse_query_token_response(&body, self.tokens.now())
    }

    async fn refresh(&self, current: AdapterCredentials) -> Result<TokenGrant, AuthError> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("client_id", current.client_id.as_str()),
            ("refresh_token", current.refresh_token().unwrap_or_default()),
        ])
        .await
    }

    async fn authorized(&self) -> Result<AdapterCredentials, PublishError> {
        self.tokens
            .authorized(|current| self.refresh(current))
            .await
            .map_err(|e| {
                tracing::error!(adapter = %self.name, error = %e, "Not authorized to post");
                PublishError::Auth(e)
            })
    }

    /// Fields every authenticated call carries
    fn auth_fields(creds: &AdapterCredentials) -> Vec<(&'static str, String)> {
        vec![
            ("oauth_consumer_key", creds.client_id.clone()),
            (
                "access_token",
                creds.access_token().unwrap_or_default().to_string(),
            ),
            ("openid", creds.openid.clone().unwrap_or_default()),
            (
                "clientip",
                creds
                    .client_ip
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLIENT_IP.to_string()),
            ),
            ("oauth_version", OAUTH_VERSION.to_string()),
            ("format", "json".to_string()),
        ]
    }

    /// Form-encoded call to `t/{api}`
    async fn call(
        &self,
        api: &str,
        fields: Vec<(&'static str, String)>,
    ) -> Result<RemoteStatus, PublishError> {
        let creds = self.authorized().await?;
        let mut form = Self::auth_fields(&creds);
        form.extend(fields);

        let url = format!("{}/t/{}", self.api_base, api);
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.network_error(api, e))?;

        self.decode(api, response).await
    }

    fn network_error(&self, api: &str, e: reqwest::Error) -> PublishError {
        tracing::error!(adapter = %self.name, api = %api, error = %e, "Error calling API");
        PublishError::Network(e.to_string())
    }

    async fn decode(
        &self,
        api: &str,
        response: reqwest::Response,
    ) -> Result<RemoteStatus, PublishError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(adapter = %self.name, api = %api, status = %status, body = %body, "HTTP error from API");
            return Err(PublishError::Network(format!("HTTP {}: {}", status, body)));
        }

        let envelope: Envelope = response.json().await.map_err(|e| {
            tracing::error!(adapter = %self.name, api = %api, error = %e, "Undecodable API response");
            PublishError::InvalidResponse(e.to_string())
        })?;

        if envelope.errcode != 0 {
            tracing::error!(
                adapter = %self.name,
                api = %api,
                errcode = envelope.errcode,
                ret = envelope.ret,
                msg = %envelope.msg,
                "API returned an error"
            );
            return Err(PublishError::Platform {
                code: envelope.errcode,
                message: envelope.msg,
            });
        }

        let data: StatusData = envelope
            .data
            .ok_or_else(|| PublishError::InvalidResponse("missing data".to_string()))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| PublishError::InvalidResponse(e.to_string()))
            })?;

        let id = data.id.to_string();
        Ok(RemoteStatus {
            url: Self::status_url(&id),
            id,
            timestamp: data.timestamp.map(|t| t.to_string()),
        })
    }
}

/// Response envelope shared by every posting API
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    ret: i64,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    id: Scalar,
    #[serde(default, alias = "time")]
    timestamp: Option<Scalar>,
}

/// A value the API sends either as a number or as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

#[async_trait]
impl PlatformAdapter for QqWeiboAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &'static str {
        Self::PLATFORM
    }

    fn auth_state(&self) -> AuthState {
        self.tokens.state()
    }

    fn credentials(&self) -> AdapterCredentials {
        self.tokens.snapshot()
    }

    fn authorize_url(&self) -> String {
        let creds = self.tokens.snapshot();
        let pending = new_pending(false);
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &creds.client_id)
            .append_pair("redirect_uri", &creds.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("state", &pending.state)
            .finish();
        self.tokens.mark_pending(pending);
        format!("{}/authorize?{}", self.auth_base, query)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let creds = self.tokens.snapshot();
        let result = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret()),
                ("code", code),
                ("redirect_uri", creds.redirect_uri.as_str()),
            ])
            .await;

        match result {
            Ok(grant) => {
                self.tokens.apply_grant(&grant);
                tracing::info!(adapter = %self.name, openid = ?grant.openid, "Authorization code exchanged");
                Ok(grant)
            }
            Err(e) => {
                tracing::error!(adapter = %self.name, error = %e, "Failed to exchange authorization code");
                self.tokens.reset();
                Err(e)
            }
        }
    }

    async fn post(&self, content: &str) -> Result<RemoteStatus, PublishError> {
        self.call("add", vec![("content", content.to_string())])
            .await
    }

    async fn repost(
        &self,
        content: &str,
        original_id: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.call(
            "re_add",
            vec![
                ("content", content.to_string()),
                ("reid", original_id.to_string()),
            ],
        )
        .await
    }

    async fn upload_by_url(
        &self,
        content: &str,
        media_url: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.call(
            "add_pic_url",
            vec![
                ("content", content.to_string()),
                ("pic_url", media_url.to_string()),
            ],
        )
        .await
    }

    async fn upload_by_data(
        &self,
        content: &str,
        media: Vec<u8>,
    ) -> Result<RemoteStatus, PublishError> {
        let api = "add_pic";
        let creds = self.authorized().await?;

        let mut form = Form::new();
        for (key, value) in Self::auth_fields(&creds) {
            form = form.text(key, value);
        }
        form = form
            .text("content", content.to_string())
            .part("pic", Part::bytes(media).file_name("image.png"));

        let url = format!("{}/t/{}", self.api_base, api);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.network_error(api, e))?;

        self.decode(api, response).await
    }
}
