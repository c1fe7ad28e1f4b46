//! Configuration loading and management

use anyhow::{Context, Result, bail};
use feed_relay_domain::AdapterCredentials;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Top-level configuration
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Filter definitions, handed to the filter factory as-is
    #[serde(default)]
    pub filters: Vec<serde_json::Value>,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_cycle_deadline")]
    pub cycle_deadline_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Rss,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: SourceType,

    /// Feed URL (rss)
    #[serde(default)]
    pub url: Option<String>,

    /// Items file (json)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    QqWeibo,
    X,
    Outbox,
    Stub,
}

#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub name: String,

    pub platform: Platform,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: Option<SecretString>,

    #[serde(default)]
    pub redirect_uri: String,

    #[serde(default)]
    pub access_token: Option<SecretString>,

    /// Absolute expiry of `access_token` (RFC 3339)
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_in: Option<OffsetDateTime>,

    #[serde(default)]
    pub refresh_token: Option<SecretString>,

    #[serde(default)]
    pub openid: Option<String>,

    #[serde(default)]
    pub client_ip: Option<String>,

    #[serde(default)]
    pub api_base: Option<String>,

    #[serde(default)]
    pub auth_base: Option<String>,

    /// Outbox file (outbox)
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_x_max_chars")]
    pub max_chars: usize,
}

impl TargetConfig {
    /// Credentials handed to the adapter
    pub fn credentials(&self) -> AdapterCredentials {
        let non_empty = |s: &Option<SecretString>| {
            s.as_ref()
                .filter(|v| !v.expose_secret().is_empty())
                .cloned()
        };

        AdapterCredentials {
            client_id: self.client_id.clone(),
            client_secret: non_empty(&self.client_secret),
            redirect_uri: self.redirect_uri.clone(),
            access_token: non_empty(&self.access_token),
            expires_in: self.expires_in,
            refresh_token: non_empty(&self.refresh_token),
            openid: self.openid.clone(),
            client_ip: self.client_ip.clone(),
            pending: None,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    300
}

fn default_call_timeout() -> u64 {
    30
}

fn default_cycle_deadline() -> u64 {
    90
}

fn default_x_max_chars() -> usize {
    280
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: default_true(),
            poll_interval_secs: default_poll_interval(),
            call_timeout_secs: default_call_timeout(),
            cycle_deadline_secs: default_cycle_deadline(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("FEED_RELAY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject names shared between sources, filters and targets
    pub fn validate(&self) -> Result<()> {
        let general = &self.general;
        for (key, value) in [
            ("poll_interval_secs", general.poll_interval_secs),
            ("call_timeout_secs", general.call_timeout_secs),
            ("cycle_deadline_secs", general.cycle_deadline_secs),
        ] {
            if value == 0 {
                bail!("general.{} must be greater than zero", key);
            }
        }

        let mut owners: HashMap<String, &'static str> = HashMap::new();

        let filter_names = self.filters.iter().filter_map(|f| {
            f.get("name")
                .and_then(|n| n.as_str())
                .map(|n| (n.to_string(), "filter"))
        });
        let names = self
            .sources
            .iter()
            .map(|s| (s.name.clone(), "source"))
            .chain(filter_names)
            .chain(self.targets.iter().map(|t| (t.name.clone(), "target")));

        for (name, kind) in names {
            if name.trim().is_empty() {
                bail!("A {} has an empty name", kind);
            }
            if let Some(previous) = owners.insert(name.clone(), kind) {
                // Duplicate filter names are skipped by the factory instead
                if previous == "filter" && kind == "filter" {
                    continue;
                }
                bail!(
                    "Name '{}' is used by both a {} and a {}",
                    name,
                    previous,
                    kind
                );
            }
        }

        for source in &self.sources {
            match source.kind {
                SourceType::Rss if source.url.is_none() => {
                    bail!("RSS source '{}' needs a url", source.name)
                }
                SourceType::Json if source.path.is_none() => {
                    bail!("JSON source '{}' needs a path", source.name)
                }
                _ => {}
            }
        }

        for target in &self.targets {
            if matches!(target.platform, Platform::QqWeibo | Platform::X)
                && target.client_id.is_empty()
            {
                bail!("Target '{}' needs a client_id", target.name);
            }
        }

        Ok(())
    }

    pub fn target(&self, name: &str) -> Result<&TargetConfig> {
        match self.targets.iter().find(|t| t.name == name) {
            Some(target) => Ok(target),
            None => bail!("No target named '{}' in configuration", name),
        }
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# feed-relay configuration

[general]
log_level = "info"
dry_run = true
poll_interval_secs = 300
# Upper bound on one posting call, and on publishing one item everywhere
call_timeout_secs = 30
cycle_deadline_secs = 90

[[sources]]
name = "moegirl"
type = "rss"  # rss, json
url = "https://zh.moegirl.org.cn/index.php?title=Special:RecentChanges&feed=rss"

# [[sources]]
# name = "local"
# type = "json"
# path = "./items.json"

# Filters run in the order listed. Unknown types are skipped with a warning.
[[filters]]
type = "wiki-cleanup"  # wiki-cleanup (alias moegirlwiki), template-truncate (alias basic)
name = "cleanup"

[[filters]]
type = "template-truncate"
name = "format"
format = "【{{title}}】{{content}} {{link}}"
maxLength = 120

[[targets]]
name = "weibo"
platform = "qq_weibo"  # qq_weibo, x, outbox, stub
client_id = "your_app_key"
client_secret = "your_app_secret"
redirect_uri = "http://localhost/callback"
# Filled in from `feed-relay auth exchange`:
# access_token = ""
# expires_in = "2030-01-01T00:00:00Z"
# refresh_token = ""
# openid = ""
# client_ip = "127.0.0.1"

# [[targets]]
# name = "x"
# platform = "x"
# client_id = "your_client_id"
# redirect_uri = "http://localhost/callback"
# max_chars = 280

# [[targets]]
# name = "review"
# platform = "outbox"
# path = "./outbox.jsonl"
"#
        .to_string()
    }
}
