//! vidlink store: durable key-value storage for ports, flags and the queue mirror.

pub mod keys;
pub mod kv;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use kv::{KeyValueStore, KeyValueStoreExt};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
