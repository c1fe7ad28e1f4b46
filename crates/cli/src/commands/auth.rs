//! Auth command - OAuth2 authorization for targets

use anyhow::{Context, Result, bail};
use feed_relay_domain::{AuthState, PendingAuthorization};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::args::{AuthArgs, AuthCommands};
use crate::commands::run::{build_target, build_target_with};
use crate::config::AppConfig;

/// File next to the config that carries requests from `auth url` to `auth exchange`
const PENDING_FILE: &str = ".feed-relay-auth.json";

#[derive(Debug, Serialize)]
struct TargetStatus {
    name: String,
    platform: &'static str,
    state: &'static str,
    expires_at: Option<String>,
}

/// Authorization request saved by `auth url`
#[derive(Debug, Serialize, Deserialize)]
struct SavedRequest {
    state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code_verifier: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl SavedRequest {
    fn from_pending(pending: &PendingAuthorization) -> Self {
        Self {
            state: pending.state.clone(),
            code_verifier: pending
                .code_verifier
                .as_ref()
                .map(|v| v.expose_secret().to_string()),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn into_pending(self) -> PendingAuthorization {
        PendingAuthorization {
            state: self.state,
            code_verifier: self.code_verifier.map(|v| SecretString::new(v.into())),
        }
    }
}

/// Saved requests keyed by target name
#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingStore {
    #[serde(flatten)]
    requests: BTreeMap<String, SavedRequest>,
}

impl PendingStore {
    fn path(config_path: Option<&Path>) -> PathBuf {
        config_path
            .and_then(Path::parent)
            .map(|dir| dir.join(PENDING_FILE))
            .unwrap_or_else(|| PathBuf::from(PENDING_FILE))
    }

    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn save(&self, path: &Path) -> Result<()> {
        if self.requests.is_empty() {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            return Ok(());
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}

pub async fn execute(args: AuthArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let pending_path = PendingStore::path(config_path.as_deref());

    match args.command {
        AuthCommands::Url { target } => {
            let adapter = build_target(config.target(&target)?, &config).await?;
            let url = adapter.authorize_url();

            if let Some(pending) = adapter.credentials().pending {
                let mut store = PendingStore::load(&pending_path)?;
                store
                    .requests
                    .insert(target.clone(), SavedRequest::from_pending(&pending));
                store.save(&pending_path)?;
                tracing::debug!(adapter = %target, path = %pending_path.display(), "Saved authorization request");
            }

            println!("{}", url);
            eprintln!();
            eprintln!("Open the URL above, approve access, then run:");
            eprintln!(
                "  feed-relay auth exchange --target {} --code <code> --state <state>",
                target
            );
            Ok(())
        }
        AuthCommands::Exchange {
            target,
            code,
            state,
        } => {
            let target_config = config.target(&target)?;
            let mut store = PendingStore::load(&pending_path)?;
            let saved = store.requests.remove(&target).map(SavedRequest::into_pending);

            if let Some(state) = &state {
                match &saved {
                    Some(pending) if pending.matches_state(state) => {}
                    Some(_) => bail!(
                        "State mismatch for target '{}': the code does not belong to the last `auth url` request",
                        target
                    ),
                    None => bail!(
                        "No saved authorization request for target '{}'; run `auth url` first",
                        target
                    ),
                }
            }

            let mut credentials = target_config.credentials();
            credentials.pending = saved;
            let adapter = build_target_with(target_config, credentials, &config).await?;

            adapter
                .exchange_code(&code)
                .await
                .with_context(|| format!("Failed to exchange code for target '{}'", target))?;
            store.save(&pending_path)?;

            let credentials = adapter.credentials();
            let tokens = serde_json::json!({
                "access_token": credentials.access_token(),
                "expires_in": credentials.expires_in.and_then(|t| t.format(&Rfc3339).ok()),
                "refresh_token": credentials.refresh_token(),
                "openid": credentials.openid,
            });
            println!("{}", serde_json::to_string_pretty(&tokens)?);
            eprintln!();
            eprintln!(
                "Copy access_token, expires_in, refresh_token and openid into the [[targets]] entry for '{}'.",
                target
            );
            Ok(())
        }
        AuthCommands::Status { json } => {
            let mut statuses = Vec::with_capacity(config.targets.len());
            for target in &config.targets {
                let adapter = build_target(target, &config).await?;
                statuses.push(describe(&target.name, adapter.platform(), adapter.auth_state()));
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else if statuses.is_empty() {
                println!("No targets configured.");
            } else {
                for status in &statuses {
                    match &status.expires_at {
                        Some(expires_at) => println!(
                            "{} ({}): {}, expires {}",
                            status.name, status.platform, status.state, expires_at
                        ),
                        None => println!("{} ({}): {}", status.name, status.platform, status.state),
                    }
                }
            }
            Ok(())
        }
    }
}

fn describe(name: &str, platform: &'static str, state: AuthState) -> TargetStatus {
    let (state, expires_at) = match state {
        AuthState::Unauthenticated => ("unauthenticated", None),
        AuthState::PendingCode => ("pending_code", None),
        AuthState::Authenticated { expires_at } => (
            "authenticated",
            expires_at.and_then(|t| t.format(&Rfc3339).ok()),
        ),
    };

    TargetStatus {
        name: name.to_string(),
        platform,
        state,
        expires_at,
    }
}
