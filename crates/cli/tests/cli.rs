use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_items(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("items.json");
    fs::write(
        &path,
        r#"[
  {"title": "Kirino", "content": "{{Infobox}}'''Kirino''' is a [[character]] in [[OreImo|the series]].",
   "link": "https://example.com/kirino", "published_at": "2024-01-01T00:00:00Z"},
  {"title": "Kuroneko", "content": "Also [[File:cat.png]]known as Ruri.",
   "link": "https://example.com/kuroneko", "published_at": "2024-01-02T00:00:00Z",
   "media": {"url": "https://example.com/ruri.png"}}
]"#,
    )
    .expect("write items");
    path
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).expect("write config");
    path
}

fn relay_config(items: &Path, outbox: &Path, dry_run: bool) -> String {
    format!(
        r#"
[general]
dry_run = {dry_run}

[[sources]]
name = "local"
type = "json"
path = "{items}"

[[filters]]
type = "moegirlwiki"
name = "cleanup"

[[filters]]
type = "basic"
name = "format"
format = "{{{{title}}}}: {{{{content}}}}"
maxLength = 30

[[targets]]
name = "review"
platform = "outbox"
path = "{outbox}"

[[targets]]
name = "local-stub"
platform = "stub"
"#,
        dry_run = dry_run,
        items = items.display(),
        outbox = outbox.display(),
    )
}

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("nested").join("config.toml");

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("[[filters]]"));
    assert!(content.contains("dry_run = true"));

    let mut again = cargo_bin_cmd!("feed-relay");
    again
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn filters_check_reports_skipped_filters() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(
        &dir,
        r#"
[[filters]]
type = "wiki-cleanup"
name = "cleanup"

[[filters]]
type = "no-such-filter"
name = "mystery"

[[filters]]
type = "template-truncate"
name = "format"
format = "{{title}}"
"#,
    );

    let mut cmd = cargo_bin_cmd!("feed-relay");
    let output = cmd
        .arg("--config")
        .arg(&config)
        .args(["filters", "check", "--json"])
        .output()
        .expect("run filters check");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let loaded: Vec<&str> = value["loaded"]
        .as_array()
        .expect("loaded array")
        .iter()
        .map(|f| f["name"].as_str().expect("name"))
        .collect();
    assert_eq!(loaded, vec!["cleanup", "format"]);
    assert_eq!(value["skipped"][0]["name"], "mystery");
}

#[test]
fn filters_check_fails_on_invalid_template() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(
        &dir,
        r#"
[[filters]]
type = "template-truncate"
name = "broken"
format = "{{#if title}}never closed"
"#,
    );

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["filters", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken"));
}

#[test]
fn run_rejects_zero_poll_interval() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(
        &dir,
        r#"
[general]
poll_interval_secs = 0
"#,
    );

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_interval_secs"));
}

#[test]
fn config_rejects_shared_names() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(
        &dir,
        r#"
[[filters]]
type = "wiki-cleanup"
name = "main"

[[targets]]
name = "main"
platform = "stub"
"#,
    );

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["filters", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("main"));
}

#[test]
fn run_once_publishes_filtered_items_to_outbox() {
    let dir = TempDir::new().expect("temp dir");
    let items = write_items(&dir);
    let outbox = dir.path().join("outbox.jsonl");
    let config = write_config(&dir, &relay_config(&items, &outbox, false));

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["run", "--once"])
        .assert()
        .success();

    let contents = fs::read_to_string(&outbox).expect("read outbox");
    let lines: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid json"))
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["operation"], "post");
    assert_eq!(lines[1]["operation"], "upload_by_url");
    assert_eq!(lines[1]["media_url"], "https://example.com/ruri.png");

    for line in &lines {
        let content = line["content"].as_str().expect("content");
        assert!(content.chars().count() <= 30, "{:?} too long", content);
        assert!(!content.contains("[["));
        assert!(!content.contains("{{"));
    }
    assert!(lines[0]["content"]
        .as_str()
        .expect("content")
        .starts_with("Kirino: Kirino is a character"));
}

#[test]
fn run_once_dry_run_publishes_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let items = write_items(&dir);
    let outbox = dir.path().join("outbox.jsonl");
    let config = write_config(&dir, &relay_config(&items, &outbox, false));

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["run", "--once", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("DRY RUN"));

    let contents = fs::read_to_string(&outbox).unwrap_or_default();
    assert!(contents.is_empty());
}

const X_TARGET: &str = r#"
[[targets]]
name = "x-main"
platform = "x"
client_id = "client"
redirect_uri = "http://localhost/callback"
"#;

#[test]
fn auth_url_prints_authorization_url() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(
        &dir,
        r#"
[[targets]]
name = "weibo"
platform = "qq_weibo"
client_id = "app_key"
client_secret = "app_secret"
redirect_uri = "http://localhost/callback"
"#,
    );

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["auth", "url", "--target", "weibo"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "https://open.t.qq.com/cgi-bin/oauth2/authorize?client_id=app_key",
        ));
}

#[test]
fn auth_url_saves_state_and_verifier() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, X_TARGET);

    let mut cmd = cargo_bin_cmd!("feed-relay");
    let output = cmd
        .arg("--config")
        .arg(&config)
        .args(["auth", "url", "--target", "x-main"])
        .output()
        .expect("run auth url");
    assert!(output.status.success());

    let url = String::from_utf8(output.stdout).expect("utf8");
    assert!(url.contains("code_challenge_method=S256"));

    let saved: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join(".feed-relay-auth.json")).expect("saved request"),
    )
    .expect("valid json");
    let state = saved["x-main"]["state"].as_str().expect("state");
    let verifier = saved["x-main"]["code_verifier"].as_str().expect("verifier");

    assert!(url.contains(&format!("state={}", state)));
    assert!(!url.contains(verifier));
    assert!(verifier.len() >= 43);
}

#[test]
fn auth_exchange_rejects_mismatched_state() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, X_TARGET);

    let mut url = cargo_bin_cmd!("feed-relay");
    url.arg("--config")
        .arg(&config)
        .args(["auth", "url", "--target", "x-main"])
        .assert()
        .success();

    let mut exchange = cargo_bin_cmd!("feed-relay");
    exchange
        .arg("--config")
        .arg(&config)
        .args([
            "auth", "exchange", "--target", "x-main", "--code", "abc", "--state", "forged",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("State mismatch"));
}

#[test]
fn auth_exchange_without_saved_request_fails_for_pkce_target() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, X_TARGET);

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["auth", "exchange", "--target", "x-main", "--code", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No pending authorization"));
}

#[test]
fn auth_status_lists_targets() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(
        &dir,
        r#"
[[targets]]
name = "weibo"
platform = "qq_weibo"
client_id = "app_key"
access_token = "token"
expires_in = "2030-01-01T00:00:00Z"

[[targets]]
name = "x-main"
platform = "x"
client_id = "client"
"#,
    );

    let mut cmd = cargo_bin_cmd!("feed-relay");
    let output = cmd
        .arg("--config")
        .arg(&config)
        .args(["auth", "status", "--json"])
        .output()
        .expect("run auth status");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value[0]["name"], "weibo");
    assert_eq!(value[0]["state"], "authenticated");
    assert_eq!(value[0]["expires_at"], "2030-01-01T00:00:00Z");
    assert_eq!(value[1]["platform"], "x");
    assert_eq!(value[1]["state"], "unauthenticated");
}

#[test]
fn auth_exchange_unknown_target_fails() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, "");

    let mut cmd = cargo_bin_cmd!("feed-relay");
    cmd.arg("--config")
        .arg(&config)
        .args(["auth", "exchange", "--target", "nope", "--code", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No target named 'nope'"));
}
