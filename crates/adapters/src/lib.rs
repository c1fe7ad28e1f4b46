//! feed-relay adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `oauth`: token state shared by the OAuth2 platform adapters
//! - `qq_weibo`: Tencent Weibo open API adapter
//! - `x_api`: X (Twitter) API adapter
//! - `outbox`: JSONL outbox adapter for human review
//! - `stub`: in-memory adapter
//! - `feeds`: RSS, JSON file and stub feed sources

pub mod feeds;
pub mod oauth;
pub mod outbox;
pub mod qq_weibo;
pub mod stub;
pub mod x_api;
