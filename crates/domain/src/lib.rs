//! feed-relay domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `filter`: Filter trait, variants and the registry-based factory
//! - `usecases`: Publishing dispatch and the relay cycle

pub mod filter;
pub mod model;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;
