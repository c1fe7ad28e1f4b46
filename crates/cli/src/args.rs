//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// feed-relay: relay feed items through a filter chain to social platforms
#[derive(Parser, Debug)]
#[command(name = "feed-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll sources, filter items, and publish to every target
    Run(RunArgs),

    /// OAuth2 authorization for targets
    Auth(AuthArgs),

    /// Inspect the configured filter chain
    Filters(FiltersArgs),

    /// Configuration management
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run in dry-run mode (no actual publishing)
    #[arg(long)]
    pub dry_run: bool,

    /// Process one poll cycle and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Print the URL to open to grant access
    Url {
        /// Target name from the configuration
        #[arg(long)]
        target: String,
    },

    /// Exchange an authorization code and print the resulting credentials
    Exchange {
        /// Target name from the configuration
        #[arg(long)]
        target: String,

        /// Authorization code from the redirect
        #[arg(long)]
        code: String,

        /// `state` parameter from the redirect, checked against the saved request
        #[arg(long)]
        state: Option<String>,
    },

    /// Show the authorization state of every target
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct FiltersArgs {
    #[command(subcommand)]
    pub command: FiltersCommands,
}

#[derive(Subcommand, Debug)]
pub enum FiltersCommands {
    /// Build the filter chain and report loaded and skipped filters
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}
