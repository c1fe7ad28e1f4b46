//! Filters command - inspect the configured filter chain

use anyhow::Result;
use feed_relay_domain::filter::FilterFactory;
use serde::Serialize;
use std::path::PathBuf;

use crate::args::{FiltersArgs, FiltersCommands};
use crate::commands::run::build_filter_chain;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct ChainReport {
    loaded: Vec<LoadedFilter>,
    skipped: Vec<SkippedEntry>,
    known_types: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LoadedFilter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct SkippedEntry {
    name: String,
    reason: String,
}

pub async fn execute(args: FiltersArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.command {
        FiltersCommands::Check { json } => check(config_path, json),
    }
}

fn check(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let chain = build_filter_chain(&config)?;

    let report = ChainReport {
        loaded: chain
            .describe()
            .into_iter()
            .map(|(name, kind)| LoadedFilter {
                name: name.to_string(),
                kind: kind.to_string(),
            })
            .collect(),
        skipped: chain
            .skipped()
            .iter()
            .map(|s| SkippedEntry {
                name: s.name.clone(),
                reason: s.reason.clone(),
            })
            .collect(),
        known_types: FilterFactory::with_builtin()
            .known_types()
            .into_iter()
            .map(String::from)
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Loaded {} filter(s):", report.loaded.len());
    for (i, filter) in report.loaded.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, filter.name, filter.kind);
    }

    if !report.skipped.is_empty() {
        println!();
        println!("Skipped {} filter(s):", report.skipped.len());
        for skipped in &report.skipped {
            println!("  - {}: {}", skipped.name, skipped.reason);
        }
    }

    Ok(())
}
