//! vidlink core: configuration, error taxonomy, shared types and events.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{BridgeConfig, DataPaths, DiscoveryOrder};
pub use error::{Error, Result};
pub use events::{BridgeEvent, EventBus};
pub use types::*;
