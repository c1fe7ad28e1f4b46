//! Application use cases / business logic

pub mod dispatch;
pub mod relay;

pub use dispatch::{DispatchConfig, PublishDispatcher};
pub use relay::{Relay, RelayConfig, RelayError, RelayedItem};
