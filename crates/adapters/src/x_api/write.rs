//! Posting half of the X adapter

use async_trait::async_trait;
use feed_relay_domain::{
    AdapterCredentials, AuthError, AuthState, PlatformAdapter, PublishError, RemoteStatus,
    TokenGrant,
};
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{SCOPES, XAdapter};
use crate::oauth::{code_challenge, new_pending};

#[derive(Serialize)]
struct CreateTweetRequest {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quote_tweet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaIds>,
}

#[derive(Serialize)]
struct MediaIds {
    media_ids: Vec<String>,
}

#[derive(Deserialize)]
struct IdResponse {
    data: IdData,
}

#[derive(Deserialize)]
struct IdData {
    id: String,
}

impl XAdapter {
    async fn bearer(&self) -> Result<String, PublishError> {
        let creds = self
            .tokens
            .authorized(|current| self.refresh(current))
            .await
            .map_err(|e| {
                tracing::error!(adapter = %self.name, error = %e, "Not authorized to post");
                PublishError::Auth(e)
            })?;
        Ok(creds.access_token().unwrap_or_default().to_string())
    }

    async fn create_post(&self, request: CreateTweetRequest) -> Result<RemoteStatus, PublishError> {
        let len = request.text.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let token = self.bearer().await?;
        let url = format!("{}/2/tweets", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let created: IdResponse = self.decode(response, "create post").await?;
        Ok(RemoteStatus {
            url: Self::status_url(&created.data.id),
            id: created.data.id,
            timestamp: None,
        })
    }

    async fn upload_media(&self, media: Vec<u8>) -> Result<String, PublishError> {
        let token = self.bearer().await?;
        let url = format!("{}/2/media/upload", self.api_base);

        let form = Form::new()
            .text("media_category", "tweet_image")
            .part("media", Part::bytes(media).file_name("image.png"));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let uploaded: IdResponse = self.decode(response, "upload media").await?;
        Ok(uploaded.data.id)
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> Result<T, PublishError> {
        let status = response.status();

        if status == 401 {
            tracing::error!(adapter = %self.name, action = %action, "User token rejected");
            return Err(PublishError::Auth(AuthError::Remote(
                "Invalid user token".to_string(),
            )));
        }

        if status == 429 {
            tracing::warn!(adapter = %self.name, action = %action, "Rate limited");
            return Err(PublishError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(adapter = %self.name, action = %action, status = %status, body = %body, "API error");
            return Err(PublishError::Platform {
                code: i64::from(status.as_u16()),
                message: format!("Failed to {}: {}", action, body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PlatformAdapter for XAdapter {
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
        let pending = new_pending(true);
        let challenge = pending
            .code_verifier
            .as_ref()
            .map(code_challenge)
            .unwrap_or_default();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &creds.client_id)
            .append_pair("redirect_uri", &creds.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", &pending.state)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256")
            .finish();
        self.tokens.mark_pending(pending);
        format!("{}?{}", self.authorize_base, query)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let creds = self.tokens.snapshot();
        let Some(verifier) = creds
            .pending
            .as_ref()
            .and_then(|p| p.code_verifier.as_ref())
        else {
            tracing::error!(adapter = %self.name, "No PKCE verifier for this authorization code");
            return Err(AuthError::NoPendingAuthorization);
        };

        let result = self
            .request_token(
                &creds,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", creds.redirect_uri.as_str()),
                    ("client_id", creds.client_id.as_str()),
                    ("code_verifier", verifier.expose_secret()),
                ],
            )
            .await;

        match result {
            Ok(grant) => {
                self.tokens.apply_grant(&grant);
                tracing::info!(adapter = %self.name, "Authorization code exchanged");
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
        self.create_post(CreateTweetRequest {
            text: content.to_string(),
            quote_tweet_id: None,
            media: None,
        })
        .await
    }

    async fn repost(
        &self,
        content: &str,
        original_id: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.create_post(CreateTweetRequest {
            text: content.to_string(),
            quote_tweet_id: Some(original_id.to_string()),
            media: None,
        })
        .await
    }

    /// X cannot attach remote images, so the link goes into the text
    async fn upload_by_url(
        &self,
        content: &str,
        media_url: &str,
    ) -> Result<RemoteStatus, PublishError> {
        self.create_post(CreateTweetRequest {
            text: format!("{} {}", content, media_url),
            quote_tweet_id: None,
            media: None,
        })
        .await
    }

    async fn upload_by_data(
        &self,
        content: &str,
        media: Vec<u8>,
    ) -> Result<RemoteStatus, PublishError> {
        let len = content.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let media_id = self.upload_media(media).await?;
        self.create_post(CreateTweetRequest {
            text: content.to_string(),
            quote_tweet_id: None,
            media: Some(MediaIds {
                media_ids: vec![media_id],
            }),
        })
        .await
    }
}
