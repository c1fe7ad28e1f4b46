//! Subcommand implementations

pub mod auth;
pub mod config;
pub mod filters;
pub mod run;
