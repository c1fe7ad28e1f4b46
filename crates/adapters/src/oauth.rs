//! OAuth2 token state shared by the platform adapters

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use feed_relay_domain::{
    AdapterCredentials, AuthError, AuthState, Clock, PendingAuthorization, TokenGrant,
};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Credentials plus authentication state for one adapter
///
/// Reading an unexpired token only takes a shared read guard. Refreshing runs
/// under a per-cell async mutex, so concurrent callers that all see an
/// expired token trigger a single refresh.
pub struct TokenCell {
    state: RwLock<AdapterCredentials>,
    refresh_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl TokenCell {
    pub fn new(credentials: AdapterCredentials, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(credentials),
            refresh_lock: Mutex::new(()),
            clock,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn snapshot(&self) -> AdapterCredentials {
        self.read(|creds| creds.clone())
    }

    pub fn state(&self) -> AuthState {
        self.read(|creds| match creds.access_token() {
            Some(_) => AuthState::Authenticated {
                expires_at: creds.expires_in,
            },
            None if creds.pending.is_some() => AuthState::PendingCode,
            None => AuthState::Unauthenticated,
        })
    }

    /// Record the authorization request a handed-out URL belongs to
    pub fn mark_pending(&self, pending: PendingAuthorization) {
        self.write(|creds| creds.pending = Some(pending));
    }

    /// Store a granted token; fields missing from the grant keep their old value
    pub fn apply_grant(&self, grant: &TokenGrant) {
        self.write(|creds| {
            creds.access_token = Some(grant.access_token.clone());
            creds.expires_in = grant.expires_at;
            if grant.refresh_token.is_some() {
                creds.refresh_token = grant.refresh_token.clone();
            }
            if grant.openid.is_some() {
                creds.openid = grant.openid.clone();
            }
            creds.pending = None;
        });
    }

    /// Drop all token state and return to `Unauthenticated`
    pub fn reset(&self) {
        self.write(AdapterCredentials::clear_tokens);
    }

    /// Credentials with a usable access token, refreshing first if it expired
    pub async fn authorized<F, Fut>(&self, refresh: F) -> Result<AdapterCredentials, AuthError>
    where
        F: FnOnce(AdapterCredentials) -> Fut,
        Fut: Future<Output = Result<TokenGrant, AuthError>>,
    {
        let current = self.snapshot();
        if current.has_valid_token(self.now()) {
            return Ok(current);
        }
        if current.access_token().is_none() {
            return Err(AuthError::NotAuthenticated);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        let current = self.snapshot();
        if current.has_valid_token(self.now()) {
            return Ok(current);
        }
        if current.access_token().is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        if current.refresh_token().is_none() {
            tracing::warn!("Access token expired and no refresh token is available");
            self.reset();
            return Err(AuthError::Expired("no refresh token".to_string()));
        }

        tracing::info!("Refreshing expired access token");
        match refresh(current).await {
            Ok(grant) => {
                self.apply_grant(&grant);
                Ok(self.snapshot())
            }
            Err(e) => {
                tracing::error!(error = %e, "Token refresh failed");
                self.reset();
                Err(AuthError::Expired(e.to_string()))
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(&AdapterCredentials) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut AdapterCredentials)) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Fresh random `state`, plus a PKCE verifier when `with_verifier` is set
pub fn new_pending(with_verifier: bool) -> PendingAuthorization {
    PendingAuthorization {
        state: Uuid::new_v4().simple().to_string(),
        code_verifier: with_verifier.then(|| {
            let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
            SecretString::new(verifier.into())
        }),
    }
}

/// S256 PKCE challenge for a verifier
pub fn code_challenge(verifier: &SecretString) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.expose_secret().as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Parse a query-string token response (`access_token=...&expires_in=...`)
pub fn parse_query_token_response(
    body: &str,
    now: OffsetDateTime,
) -> Result<TokenGrant, AuthError> {
    let fields: HashMap<String, String> = url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect();
    grant_from_fields(
        fields.get("error").map(String::as_str),
        fields.get("access_token").map(String::as_str),
        fields.get("refresh_token").map(String::as_str),
        fields.get("openid").map(String::as_str),
        fields.get("expires_in").and_then(|v| v.parse::<i64>().ok()),
        now,
    )
}

/// Validate token response fields and turn them into a grant
pub fn grant_from_fields(
    error: Option<&str>,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    openid: Option<&str>,
    expires_in_secs: Option<i64>,
    now: OffsetDateTime,
) -> Result<TokenGrant, AuthError> {
    if let Some(error) = error.filter(|e| !e.is_empty()) {
        return Err(AuthError::Remote(error.to_string()));
    }
    let access_token = access_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let expires_at = match expires_in_secs.filter(|secs| *secs > 0) {
        Some(secs) => Some(
            now.checked_add(Duration::seconds(secs))
                .ok_or_else(|| AuthError::Remote(format!("invalid expires_in: {}", secs)))?,
        ),
        None => None,
    };

    let secret = |v: &str| SecretString::new(v.into());

    Ok(TokenGrant {
        access_token: secret(access_token),
        refresh_token: refresh_token.filter(|s| !s.is_empty()).map(secret),
        openid: openid.filter(|s| !s.is_empty()).map(String::from),
        expires_at,
    })
}
